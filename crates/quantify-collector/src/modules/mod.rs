//! 명령별 작업 모듈.

pub mod assets;
pub mod query;
pub mod sync;

pub use assets::refresh_assets;
pub use query::{get_data, parse_date, render, resolve_symbols, GetDataOptions, OutputFormat};
pub use sync::sync_basket;
