mod listener_test;
