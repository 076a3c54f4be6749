pub mod consumer_worker;
