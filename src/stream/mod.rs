mod gop_cache;

pub use gop_cache::GopCache;
