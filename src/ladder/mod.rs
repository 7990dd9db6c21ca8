pub mod cache;
pub mod grouper;
pub mod rank;

pub use cache::ScanCache;
pub use grouper::group;
pub use rank::RankAssigner;
