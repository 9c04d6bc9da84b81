mod blocking_retry_test;
