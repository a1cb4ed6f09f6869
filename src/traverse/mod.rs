pub mod graph_cache;
pub mod graph_crawler;
pub mod graph_walker;
pub mod repeat_walker;

pub use graph_cache::GraphCache;
pub use graph_crawler::{CrawlHooks, GraphCrawler, MultiColPath};
pub use graph_walker::{GraphWalker, StopReason};
pub use repeat_walker::RepeatWalker;
