//! Contrastive experience extraction
//!
//! - `contrast`: prompt construction and the retried model call
//! - `decision`: the add/modify/delete decision and its reply parser

pub mod contrast;
pub mod decision;

pub use contrast::ContrastSummarizer;
pub use decision::{parse_decision, Decision};
