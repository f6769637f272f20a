mod deploy_tests;
mod system_tests;
