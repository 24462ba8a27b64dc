pub mod codec;
pub mod fuzzy;
pub mod item;
pub mod view;

pub use codec::CodecOptions;
pub use item::{Item, ItemFields, ItemStatus};
pub use view::{ListView, SortMode, ViewOptions};
