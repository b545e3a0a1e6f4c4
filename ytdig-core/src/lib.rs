mod client;
mod model;
mod session;

pub use client::{
    CatalogError, DEFAULT_BASE_URL, DEFAULT_MAX_PAGES, DEFAULT_PAGE_SIZE, YoutubeClient,
};
pub use model::{Channel, Merge, Thumbnail, Thumbnails, Video};
pub use session::{Session, SessionUser};
