mod common;

mod block_fetcher_tests;
mod reverse_block_fetcher_tests;
