/*! Integration tests for netconverge.
 *
 * This test suite is organized as a single integration test binary
 * following the pattern described by matklad in
 * https://matklad.github.io/2021/02/27/delete-cargo-integration-tests.html
 *
 * The module structure mirrors the main library structure:
 * - tree: Tests for paths and configuration values
 * - flatten: Tests for flattening trees into path/value updates
 * - delta: Tests for the delta calculator
 * - leafref: Tests for leaf-reference validation
 * - index: Tests for list-entry key tracking across cycles
 * - reconcile: Tests for the reconcile state machine, fan-out and registration
 * - subscription: Tests for the target subscription manager
 * - config: Tests for engine configuration and schema loading
 */

use tracing_subscriber::EnvFilter;

#[ctor::ctor]
fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("netconverge=info".parse().unwrap()),
        )
        .with_test_writer()
        .try_init();
}

mod config;
mod delta;
mod flatten;
mod helpers;
mod index;
mod leafref;
mod reconcile;
mod subscription;
mod tree;
