pub mod asset;
pub mod bar;
pub mod bar_sequence;
pub mod bucket;
pub mod request_params;
pub mod timeframe;
pub mod tz;
