//! Config env-var parsing tests. Run serially (via a shared mutex) because
//! `std::env::set_var` is process-global and `#[tokio::test]`/`#[test]`
//! functions otherwise run concurrently.

use std::sync::Mutex;

use crate::config::Config;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn with_env<F: FnOnce()>(vars: &[(&str, &str)], f: F) {
    let _guard = ENV_LOCK.lock().unwrap_or_else(|p| p.into_inner());
    for (k, v) in vars {
        unsafe { std::env::set_var(k, v) };
    }
    f();
    for (k, _) in vars {
        unsafe { std::env::remove_var(k) };
    }
}

#[test]
fn defaults_are_sane_with_no_environment() {
    with_env(&[], || {
        let config = Config::from_env().expect("defaults must parse");
        assert_eq!(config.quote_currency, "USDT");
        assert_eq!(config.pivot_left, 1);
        assert_eq!(config.pivot_right, 1);
        assert!(!config.enable_trading);
        assert!(config.demo_trading);
        assert_eq!(config.timeframes.len(), 1);
    });
}

#[test]
fn symbols_list_is_comma_split_and_trimmed() {
    with_env(&[("SYMBOLS", "BTCUSDT, ETHUSDT ,SOLUSDT")], || {
        let config = Config::from_env().unwrap();
        assert_eq!(config.symbols, vec!["BTCUSDT", "ETHUSDT", "SOLUSDT"]);
        assert!(!config.fetch_all_coins);
    });
}

#[test]
fn empty_symbols_defaults_to_fetch_all_coins() {
    with_env(&[], || {
        let config = Config::from_env().unwrap();
        assert!(config.symbols.is_empty());
        assert!(config.fetch_all_coins);
    });
}

#[test]
fn timeframes_parse_native_and_synthetic() {
    with_env(&[("TIMEFRAMES", "15m,1h,25m")], || {
        let config = Config::from_env().unwrap();
        assert_eq!(config.timeframes.len(), 3);
        assert!(config.timeframes[2].is_synthetic());
    });
}

#[test]
fn malformed_timeframe_is_a_config_error() {
    with_env(&[("TIMEFRAMES", "7m")], || {
        assert!(Config::from_env().is_err());
    });
}

#[test]
fn allow_list_flags_default_to_all_allowed() {
    with_env(&[], || {
        let config = Config::from_env().unwrap();
        let allow = config.allow_list.to_allow_list();
        use crate::domain::pivot::PivotVariant;
        assert!(allow.is_allowed(PivotVariant::Ph3));
        assert!(allow.is_allowed(PivotVariant::Pl5));
    });
}

#[test]
fn allow_list_respects_individual_overrides() {
    with_env(&[("ALLOW_PH4", "false"), ("ALLOW_PL2", "false")], || {
        let config = Config::from_env().unwrap();
        let allow = config.allow_list.to_allow_list();
        use crate::domain::pivot::PivotVariant;
        assert!(!allow.is_allowed(PivotVariant::Ph4));
        assert!(!allow.is_allowed(PivotVariant::Pl2));
        assert!(allow.is_allowed(PivotVariant::Ph1));
    });
}

#[test]
fn position_size_and_leverage_are_decimal() {
    with_env(&[("POSITION_SIZE", "250.5"), ("LEVERAGE", "3")], || {
        let config = Config::from_env().unwrap();
        assert_eq!(config.position_size, rust_decimal_macros::dec!(250.5));
        assert_eq!(config.leverage, rust_decimal_macros::dec!(3));
    });
}
