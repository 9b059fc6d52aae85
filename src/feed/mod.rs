mod fetch;
mod parse;

pub use fetch::{RadioFeed, TrackSource};
pub use parse::{Track, parse_tracks};
