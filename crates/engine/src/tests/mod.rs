mod helpers;

mod compaction_tests;
mod write_tests;
