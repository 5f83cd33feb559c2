/*!
 * API credential rotation.
 *
 * Holds the set of backend credentials, picks one per call according to the
 * configured strategy, tracks daily usage against each credential's limit and
 * quarantines credentials that the backend rejected. Quarantine and usage are
 * reset when the local date rolls over, or per credential by a successful
 * re-probe.
 *
 * All state sits behind one mutex: selection, usage accounting, quarantine
 * changes and the rollover reset never interleave. When the policy was
 * loaded from a file, every mutation is written back to it.
 */

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Local, NaiveDate};
use log::{debug, info, warn};
use parking_lot::Mutex;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::errors::CredentialError;
use crate::providers::TranslationBackend;

/// Environment variable used to seed a fresh credential file
pub const API_KEY_ENV: &str = "GEMINI_API_KEY";

/// Secret written to new credential files when no key is known
pub const PLACEHOLDER_KEY: &str = "YOUR_GEMINI_API_KEY";

/// How a credential is picked among the available ones
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RotationStrategy {
    /// Cycle through available credentials in order
    #[default]
    RoundRobin,
    /// Pick the credential with the lowest usage count
    LeastUsed,
    /// Pick uniformly at random
    Random,
}

impl fmt::Display for RotationStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RoundRobin => write!(f, "round_robin"),
            Self::LeastUsed => write!(f, "least_used"),
            Self::Random => write!(f, "random"),
        }
    }
}

impl std::str::FromStr for RotationStrategy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "round_robin" => Ok(Self::RoundRobin),
            "least_used" => Ok(Self::LeastUsed),
            "random" => Ok(Self::Random),
            _ => Err(anyhow::anyhow!("Invalid rotation strategy: {}", s)),
        }
    }
}

/// A backend API credential
#[derive(Clone, Serialize, Deserialize)]
pub struct Credential {
    #[serde(rename = "key")]
    pub key_secret: String,

    #[serde(rename = "name")]
    pub display_name: String,

    /// Calls spent today
    #[serde(default)]
    pub usage_count: u32,

    #[serde(default = "default_daily_limit")]
    pub daily_limit: u32,

    /// Disabled credentials are never selected
    #[serde(default = "default_true")]
    pub is_active: bool,

    #[serde(default)]
    pub last_used: Option<DateTime<Local>>,

    /// Rejected by the backend since the last reset
    #[serde(default)]
    pub quarantined: bool,

    /// Template value that was never filled in
    #[serde(default)]
    pub is_placeholder: bool,
}

fn default_daily_limit() -> u32 {
    1000
}

fn default_true() -> bool {
    true
}

impl Credential {
    /// Create a fresh credential with the default daily limit
    pub fn new(key_secret: impl Into<String>, display_name: impl Into<String>) -> Self {
        let key_secret = key_secret.into();
        let is_placeholder = looks_like_placeholder(&key_secret);
        Self {
            key_secret,
            display_name: display_name.into(),
            usage_count: 0,
            daily_limit: default_daily_limit(),
            is_active: true,
            last_used: None,
            quarantined: false,
            is_placeholder,
        }
    }

    pub fn with_daily_limit(mut self, daily_limit: u32) -> Self {
        self.daily_limit = daily_limit;
        self
    }

    /// Whether the credential may back a call right now
    pub fn is_available(&self) -> bool {
        self.is_active
            && !self.is_placeholder
            && !self.quarantined
            && self.usage_count < self.daily_limit
    }

    /// Masked form of the secret safe for logs and listings
    pub fn key_preview(&self) -> String {
        let prefix: String = self.key_secret.chars().take(10).collect();
        if self.key_secret.chars().count() > 10 {
            format!("{}...", prefix)
        } else {
            prefix
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("key_secret", &self.key_preview())
            .field("display_name", &self.display_name)
            .field("usage_count", &self.usage_count)
            .field("daily_limit", &self.daily_limit)
            .field("is_active", &self.is_active)
            .field("quarantined", &self.quarantined)
            .field("is_placeholder", &self.is_placeholder)
            .finish()
    }
}

/// Whether a secret is an unfilled template value
pub fn looks_like_placeholder(key_secret: &str) -> bool {
    let trimmed = key_secret.trim();
    trimmed.is_empty() || trimmed.starts_with(PLACEHOLDER_KEY)
}

/// Snapshot of a credential for listings
#[derive(Debug, Clone, Serialize)]
pub struct CredentialStatus {
    pub name: String,
    pub key_preview: String,
    pub usage_count: u32,
    pub daily_limit: u32,
    pub usage_percentage: f64,
    pub is_active: bool,
    pub is_placeholder: bool,
    pub quarantined: bool,
    pub last_used: Option<DateTime<Local>>,
}

impl From<&Credential> for CredentialStatus {
    fn from(credential: &Credential) -> Self {
        let usage_percentage = if credential.daily_limit == 0 {
            100.0
        } else {
            credential.usage_count as f64 / credential.daily_limit as f64 * 100.0
        };
        Self {
            name: credential.display_name.clone(),
            key_preview: credential.key_preview(),
            usage_count: credential.usage_count,
            daily_limit: credential.daily_limit,
            usage_percentage,
            is_active: credential.is_active,
            is_placeholder: credential.is_placeholder,
            quarantined: credential.quarantined,
            last_used: credential.last_used,
        }
    }
}

/// On-disk layout of the credential file
#[derive(Debug, Serialize, Deserialize)]
struct CredentialFile {
    #[serde(default)]
    credentials: Vec<Credential>,

    #[serde(default)]
    rotation_strategy: Option<RotationStrategy>,

    #[serde(default)]
    last_reset_date: Option<NaiveDate>,
}

/// Source of "today" for the daily reset
pub type Clock = Arc<dyn Fn() -> NaiveDate + Send + Sync>;

fn local_today() -> NaiveDate {
    Local::now().date_naive()
}

struct PolicyState {
    credentials: Vec<Credential>,
    strategy: RotationStrategy,
    cursor: usize,
    last_reset_date: NaiveDate,
}

/// Credential selection, accounting and quarantine
pub struct KeyRotationPolicy {
    state: Mutex<PolicyState>,
    store_path: Option<PathBuf>,
    clock: Clock,
}

impl fmt::Debug for KeyRotationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("KeyRotationPolicy")
            .field("credentials", &state.credentials)
            .field("strategy", &state.strategy)
            .field("store_path", &self.store_path)
            .finish()
    }
}

impl KeyRotationPolicy {
    /// Create an in-memory policy
    pub fn new(credentials: Vec<Credential>, strategy: RotationStrategy) -> Self {
        Self {
            state: Mutex::new(PolicyState {
                credentials,
                strategy,
                cursor: 0,
                last_reset_date: local_today(),
            }),
            store_path: None,
            clock: Arc::new(local_today),
        }
    }

    /// Replace the date source, mainly for tests of the daily reset
    pub fn with_clock(self, clock: Clock) -> Self {
        {
            let mut state = self.state.lock();
            state.last_reset_date = clock();
        }
        Self { clock, ..self }
    }

    /// Load the policy from a credential file.
    ///
    /// A missing file is created with one credential taken from
    /// `GEMINI_API_KEY`, or a placeholder when the variable is unset.
    pub fn load(path: &Path, default_strategy: RotationStrategy) -> Result<Self, CredentialError> {
        let today = local_today();
        let file = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            serde_json::from_str::<CredentialFile>(&content)?
        } else {
            warn!("Credential file not found at '{}', creating default file.", path.display());
            let key = std::env::var(API_KEY_ENV).unwrap_or_else(|_| PLACEHOLDER_KEY.to_string());
            CredentialFile {
                credentials: vec![Credential::new(key, "Default Key")],
                rotation_strategy: Some(default_strategy),
                last_reset_date: Some(today),
            }
        };

        let mut credentials = file.credentials;
        for credential in credentials.iter_mut() {
            if looks_like_placeholder(&credential.key_secret) {
                credential.is_placeholder = true;
            }
        }

        let policy = Self {
            state: Mutex::new(PolicyState {
                credentials,
                strategy: file.rotation_strategy.unwrap_or(default_strategy),
                cursor: 0,
                last_reset_date: file.last_reset_date.unwrap_or(today),
            }),
            store_path: Some(path.to_path_buf()),
            clock: Arc::new(local_today),
        };

        {
            let mut state = policy.state.lock();
            policy.roll_over_if_needed(&mut state);
            policy.save(&state)?;
        }

        Ok(policy)
    }

    /// Pick a credential, or `None` when none is available.
    ///
    /// With `consume` the pick counts toward the credential's daily usage;
    /// without it the call is a pure availability probe and mutates nothing.
    pub fn acquire(&self, consume: bool) -> Option<Credential> {
        let mut state = self.state.lock();
        self.roll_over_if_needed(&mut state);

        let available: Vec<usize> = state
            .credentials
            .iter()
            .enumerate()
            .filter(|(_, credential)| credential.is_available())
            .map(|(index, _)| index)
            .collect();

        if available.is_empty() {
            warn!("No API credential available");
            return None;
        }

        let selected = match state.strategy {
            RotationStrategy::RoundRobin => {
                // The cursor walks every credential so a quarantine does not shift the order
                let total = state.credentials.len();
                let start = state.cursor % total;
                let selected = (0..total)
                    .map(|offset| (start + offset) % total)
                    .find(|&index| state.credentials[index].is_available())
                    .unwrap_or(available[0]);
                if consume {
                    state.cursor = (selected + 1) % total;
                }
                selected
            }
            RotationStrategy::LeastUsed => available
                .iter()
                .copied()
                .min_by_key(|&index| state.credentials[index].usage_count)
                .unwrap_or(available[0]),
            RotationStrategy::Random => available[rand::rng().random_range(0..available.len())],
        };

        if !consume {
            return Some(state.credentials[selected].clone());
        }

        let credential = &mut state.credentials[selected];
        credential.usage_count += 1;
        credential.last_used = Some(Local::now());
        debug!(
            "Using API credential {} (usage {}/{})",
            credential.display_name, credential.usage_count, credential.daily_limit
        );
        let picked = credential.clone();

        self.save_logged(&state);
        Some(picked)
    }

    /// Whether any credential is currently available
    pub fn has_available(&self) -> bool {
        self.acquire(false).is_some()
    }

    /// Quarantine the credential with this secret; returns whether one was found
    pub fn quarantine(&self, key_secret: &str) -> bool {
        let mut state = self.state.lock();
        let Some(credential) = state.credentials.iter_mut().find(|c| c.key_secret == key_secret) else {
            return false;
        };

        if !credential.quarantined {
            credential.quarantined = true;
            warn!("Quarantined API credential {}", credential.display_name);
            self.save_logged(&state);
        }
        true
    }

    /// Send a probe through every quarantined credential and release those that pass.
    ///
    /// Returns the number of credentials released. Probes run without holding
    /// the lock.
    pub async fn reprobe_quarantined(&self, backend: &dyn TranslationBackend) -> usize {
        let quarantined: Vec<Credential> = {
            let state = self.state.lock();
            state.credentials.iter().filter(|c| c.quarantined).cloned().collect()
        };

        let mut recovered = Vec::new();
        for credential in &quarantined {
            match backend.probe(Some(credential)).await {
                Ok(()) => recovered.push(credential.key_secret.clone()),
                Err(e) => debug!("Credential {} still failing: {}", credential.display_name, e),
            }
        }

        if recovered.is_empty() {
            return 0;
        }

        let mut state = self.state.lock();
        let mut released = 0;
        for credential in state.credentials.iter_mut() {
            if credential.quarantined && recovered.contains(&credential.key_secret) {
                credential.quarantined = false;
                released += 1;
                info!("API credential {} passed re-probe", credential.display_name);
            }
        }
        self.save_logged(&state);
        released
    }

    /// Reset counters and quarantine if `today` is past the last reset date.
    ///
    /// Returns whether a reset happened.
    pub fn reset_if_new_day(&self, today: NaiveDate) -> bool {
        let mut state = self.state.lock();
        let reset = Self::reset_state(&mut state, today);
        if reset {
            self.save_logged(&state);
        }
        reset
    }

    fn roll_over_if_needed(&self, state: &mut PolicyState) {
        if Self::reset_state(state, (self.clock)()) {
            self.save_logged(state);
        }
    }

    fn reset_state(state: &mut PolicyState, today: NaiveDate) -> bool {
        if today <= state.last_reset_date {
            return false;
        }
        info!("Resetting daily API usage for {}", today);
        for credential in state.credentials.iter_mut() {
            credential.usage_count = 0;
            credential.quarantined = false;
        }
        state.last_reset_date = today;
        true
    }

    /// Add a credential; names must be unique
    pub fn add_credential(&self, key_secret: &str, name: &str, daily_limit: u32) -> Result<(), CredentialError> {
        let mut state = self.state.lock();
        if state.credentials.iter().any(|c| c.display_name == name) {
            return Err(CredentialError::Duplicate(name.to_string()));
        }
        state
            .credentials
            .push(Credential::new(key_secret, name).with_daily_limit(daily_limit));
        info!("Added API credential {}", name);
        self.save(&state)
    }

    /// Remove the credential with this name
    pub fn remove_credential(&self, name: &str) -> Result<(), CredentialError> {
        let mut state = self.state.lock();
        let before = state.credentials.len();
        state.credentials.retain(|c| c.display_name != name);
        if state.credentials.len() == before {
            return Err(CredentialError::NotFound(name.to_string()));
        }
        info!("Removed API credential {}", name);
        self.save(&state)
    }

    /// Flip the active flag; returns the new value
    pub fn toggle_credential(&self, name: &str) -> Result<bool, CredentialError> {
        let mut state = self.state.lock();
        let credential = state
            .credentials
            .iter_mut()
            .find(|c| c.display_name == name)
            .ok_or_else(|| CredentialError::NotFound(name.to_string()))?;
        credential.is_active = !credential.is_active;
        let is_active = credential.is_active;
        info!("API credential {} is now {}", name, if is_active { "active" } else { "disabled" });
        self.save(&state)?;
        Ok(is_active)
    }

    /// Release every quarantined credential without probing
    pub fn reset_quarantine(&self) -> Result<(), CredentialError> {
        let mut state = self.state.lock();
        for credential in state.credentials.iter_mut() {
            credential.quarantined = false;
        }
        self.save(&state)
    }

    /// Status of every credential in file order
    pub fn status(&self) -> Vec<CredentialStatus> {
        let mut state = self.state.lock();
        self.roll_over_if_needed(&mut state);
        state.credentials.iter().map(CredentialStatus::from).collect()
    }

    pub fn strategy(&self) -> RotationStrategy {
        self.state.lock().strategy
    }

    pub fn set_strategy(&self, strategy: RotationStrategy) -> Result<(), CredentialError> {
        let mut state = self.state.lock();
        state.strategy = strategy;
        state.cursor = 0;
        self.save(&state)
    }

    /// Number of credentials, available or not
    pub fn len(&self) -> usize {
        self.state.lock().credentials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().credentials.is_empty()
    }

    fn save(&self, state: &PolicyState) -> Result<(), CredentialError> {
        let Some(path) = &self.store_path else {
            return Ok(());
        };

        let file = CredentialFile {
            credentials: state.credentials.clone(),
            rotation_strategy: Some(state.strategy),
            last_reset_date: Some(state.last_reset_date),
        };

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, serde_json::to_string_pretty(&file)?)?;
        Ok(())
    }

    // Usage accounting must not fail a translation because the file is unwritable
    fn save_logged(&self, state: &PolicyState) {
        if let Err(e) = self.save(state) {
            warn!("Failed to persist credential state: {}", e);
        }
    }
}
