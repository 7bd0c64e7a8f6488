pub mod report;
pub mod resolve;
pub mod run;
pub mod simulate;
