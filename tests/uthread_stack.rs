// The default stack size is read from the environment once and cached, so
// this lives in its own test binary where nothing else has touched it.

use lazy_promise::uthread::default_stack_size;

#[test]
fn stack_size_env_override() {
    std::env::set_var("UTHREAD_STACK_SIZE_KB", "256");
    assert_eq!(default_stack_size(), 256 * 1024);
    // Cached: later changes are ignored.
    std::env::set_var("UTHREAD_STACK_SIZE_KB", "1024");
    assert_eq!(default_stack_size(), 256 * 1024);
}
