pub mod auto_review;
pub mod consensus;
pub mod ralph_run;
