mod join_tests;
