//! Paginated reader: spreads, navigation, and render instructions.

pub mod navigation;
pub mod session;
pub mod spread;
pub mod viewer;

pub use navigation::{
    ChapterList, ChapterRequest, Effect, InitialPosition, Input, Location, Notice, ScrollBehavior,
    Trigger,
};
pub use session::ReaderSession;
pub use spread::{Spread, SpreadLayout, calculate};
pub use viewer::{ImagePlacement, Limit, RenderInstruction, Sizing, page_at_scroll, render};

pub type Result<T> = crate::Result<T>;
