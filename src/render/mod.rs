//! Everything between an accepted snapshot and the lines on screen.
pub mod container;
pub mod gate;
pub mod markup;
pub mod preserve;
pub mod search;
pub mod views;

pub use container::ViewContainer;
pub use gate::{RenderDecision, run_render_cycle};
pub use preserve::{RegionId, ScrollRegion};
pub use views::DeckViews;
