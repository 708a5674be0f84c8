//! Bellows expression: pointer gestures to continuous controllers
//!
//! [`curve`] shapes normalized values, [`gesture`] owns the tracking state
//! and decides what to send.

pub mod curve;
pub mod gesture;

pub use curve::{shape, CurveType};
pub use gesture::{Direction, GestureController, GestureState, GestureUpdate, Point, PointerSample};
