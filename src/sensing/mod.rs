pub mod heading;
pub mod source;

pub use heading::{HeadingMode, HeadingProvider};
pub use source::{
    OrientationEvent, PositionEvent, SensorFault, SensorFeed, SensorSource, Subscription,
};
