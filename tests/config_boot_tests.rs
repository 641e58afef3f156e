//! Startup security validation: insecure secrets must refuse to boot.

use creator_analytics_backend::config::AppConfig;
use serial_test::serial;

fn with_env<F: FnOnce()>(vars: &[(&str, &str)], body: F) {
    for (key, value) in vars {
        std::env::set_var(key, value);
    }
    body();
    for (key, _) in vars {
        std::env::remove_var(key);
    }
}

#[test]
#[serial]
fn default_jwt_secret_fails_before_binding() {
    with_env(
        &[
            ("JWT_SECRET", "change_me_in_production"),
            ("ENCRYPTION_KEY", "0123456789abcdef0123456789abcdef"),
        ],
        || {
            let config = AppConfig::from_env().expect("config parses");
            let err = config.validate_security().expect_err("must refuse to boot");
            assert!(err.to_string().contains("JWT_SECRET"));
        },
    );
}

#[test]
#[serial]
fn short_jwt_secret_fails_even_when_non_default() {
    with_env(
        &[
            ("JWT_SECRET", "short_secret"),
            ("ENCRYPTION_KEY", "0123456789abcdef0123456789abcdef"),
        ],
        || {
            let config = AppConfig::from_env().expect("config parses");
            assert!(config.validate_security().is_err());
        },
    );
}

#[test]
#[serial]
fn default_encryption_key_fails() {
    with_env(
        &[
            ("JWT_SECRET", "a_sufficiently_long_unit_test_secret"),
            ("ENCRYPTION_KEY", "change_me_32_byte_key_for_prod"),
        ],
        || {
            let config = AppConfig::from_env().expect("config parses");
            let err = config.validate_security().expect_err("must refuse to boot");
            assert!(err.to_string().contains("ENCRYPTION_KEY"));
        },
    );
}

#[test]
#[serial]
fn strong_secrets_boot() {
    with_env(
        &[
            ("JWT_SECRET", "a_sufficiently_long_unit_test_secret"),
            ("ENCRYPTION_KEY", "0123456789abcdef0123456789abcdef"),
        ],
        || {
            let config = AppConfig::from_env().expect("config parses");
            assert!(config.validate_security().is_ok());
        },
    );
}

#[test]
#[serial]
fn credit_costs_never_go_negative() {
    with_env(
        &[
            ("FREE_MONTHLY_CREDITS", "-5"),
            ("CREDIT_COST_AUDIT_RUN", "-2"),
        ],
        || {
            let config = AppConfig::from_env().expect("config parses");
            assert_eq!(config.credits.free_monthly_credits, 0);
            assert_eq!(config.credits.cost_audit_run, 0);
        },
    );
}
