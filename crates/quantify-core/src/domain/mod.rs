//! 시장 데이터 미러의 도메인 모델.

mod asset;
mod bar;

pub use asset::*;
pub use bar::*;
