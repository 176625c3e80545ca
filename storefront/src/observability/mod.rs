pub mod request_timing;
