pub mod forward;
pub mod rewrite;
pub mod run;
