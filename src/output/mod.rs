mod report;

pub use report::write_run_report;
