// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! Configuration is loaded from the environment at startup via
//! [`Config::from_env`].
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `DATA_DIR` | Root directory for the ledger database | `/data` |
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `8080` |
//! | `MASTER_KEY` | Base64 32-byte AEAD key for the key vault | Required |
//! | `PROVIDER_URL` | Base URL of the blockchain provider API | `http://localhost:9090` |
//! | `TREASURY_ACCOUNT` | Account credited with platform fees and seizures | `treasury` |
//! | `SERVER_FEE_RATE` | Withdrawal service fee rate (fraction of amount) | `0.0002` |
//! | `ESCROW_FEE_RATE` | Platform fee on escrow release (fraction) | `0.0` |
//! | `FEE_QUOTE_TOLERANCE` | Allowed upward fee drift before a quote is stale | `0.01` |
//! | `FEE_QUOTE_VALIDITY_SECS` | Preview quote validity window | `120` |
//! | `CONFIRMATION_THRESHOLD` | Confirmations before a deposit is spendable | `1` |
//! | `DEPOSIT_POLL_SECS` | Deposit poller sweep interval | `30` |
//! | `ESCROW_SWEEP_SECS` | Escrow timeout sweeper interval | `15` |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use rust_decimal::Decimal;

/// Environment variable name for the ledger data directory path.
pub const DATA_DIR_ENV: &str = "DATA_DIR";

/// Environment variable name for the vault master key (base64, 32 bytes).
pub const MASTER_KEY_ENV: &str = "MASTER_KEY";

/// Runtime configuration, read once at startup and shared read-only.
#[derive(Debug, Clone)]
pub struct Config {
    /// Root directory for the redb ledger database.
    pub data_dir: PathBuf,
    /// HTTP bind host.
    pub host: String,
    /// HTTP bind port.
    pub port: u16,
    /// Base URL of the external blockchain provider.
    pub provider_url: String,
    /// Account id that receives platform fees and admin seizures.
    pub treasury_account: String,
    /// Withdrawal service fee as a fraction of the withdrawn amount.
    pub server_fee_rate: Decimal,
    /// Platform fee taken from a released escrow, as a fraction.
    pub escrow_fee_rate: Decimal,
    /// Allowed upward drift between an accepted fee quote and a fresh one.
    pub fee_quote_tolerance: Decimal,
    /// How long a withdrawal preview remains valid.
    pub fee_quote_validity: Duration,
    /// Confirmations required before a deposit moves pending -> available.
    pub confirmation_threshold: u32,
    /// Deposit poller sweep interval.
    pub deposit_poll_interval: Duration,
    /// Escrow timeout sweeper interval.
    pub escrow_sweep_interval: Duration,
}

impl Config {
    /// Load configuration from the environment, applying defaults.
    pub fn from_env() -> Self {
        Self {
            data_dir: env::var(DATA_DIR_ENV)
                .unwrap_or_else(|_| "/data".to_string())
                .into(),
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8080),
            provider_url: env::var("PROVIDER_URL")
                .unwrap_or_else(|_| "http://localhost:9090".to_string()),
            treasury_account: env::var("TREASURY_ACCOUNT")
                .unwrap_or_else(|_| "treasury".to_string()),
            server_fee_rate: decimal_env("SERVER_FEE_RATE", "0.0002"),
            escrow_fee_rate: decimal_env("ESCROW_FEE_RATE", "0.0"),
            fee_quote_tolerance: decimal_env("FEE_QUOTE_TOLERANCE", "0.01"),
            fee_quote_validity: Duration::from_secs(secs_env("FEE_QUOTE_VALIDITY_SECS", 120)),
            confirmation_threshold: env::var("CONFIRMATION_THRESHOLD")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(1),
            deposit_poll_interval: Duration::from_secs(secs_env("DEPOSIT_POLL_SECS", 30)),
            escrow_sweep_interval: Duration::from_secs(secs_env("ESCROW_SWEEP_SECS", 15)),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("/data"),
            host: "0.0.0.0".to_string(),
            port: 8080,
            provider_url: "http://localhost:9090".to_string(),
            treasury_account: "treasury".to_string(),
            server_fee_rate: "0.0002".parse().expect("valid decimal"),
            escrow_fee_rate: Decimal::ZERO,
            fee_quote_tolerance: "0.01".parse().expect("valid decimal"),
            fee_quote_validity: Duration::from_secs(120),
            confirmation_threshold: 1,
            deposit_poll_interval: Duration::from_secs(30),
            escrow_sweep_interval: Duration::from_secs(15),
        }
    }
}

fn decimal_env(name: &str, default: &str) -> Decimal {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or_else(|| default.parse().expect("valid default decimal"))
}

fn secs_env(name: &str, default: u64) -> u64 {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
