//! User engagement: how charging sessions spread over vehicles.

use std::collections::HashMap;

use ev_core::models::ChargingSession;
use ev_core::stats::{histogram, HistogramBin, Summary};
use serde::Serialize;

/// Sessions and energy attributed to one vehicle id.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserFrequency {
    pub ev_id: String,
    pub sessions: usize,
    pub total_energy: f64,
}

/// One point of the Pareto curve: the most active `user_share` of users
/// account for `session_share` of all sessions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ParetoPoint {
    pub user_share: f64,
    pub session_share: f64,
}

/// Sessions and energy per user, most active first (ties by id).
pub fn user_frequency_distribution(sessions: &[ChargingSession]) -> Vec<UserFrequency> {
    let mut by_user: HashMap<&str, UserFrequency> = HashMap::new();
    for s in sessions {
        let entry = by_user.entry(s.ev_id()).or_insert_with(|| UserFrequency {
            ev_id: s.ev_id().to_string(),
            sessions: 0,
            total_energy: 0.0,
        });
        entry.sessions += 1;
        entry.total_energy += s.total_energy();
    }

    let mut out: Vec<UserFrequency> = by_user.into_values().collect();
    out.sort_by(|a, b| b.sessions.cmp(&a.sessions).then_with(|| a.ev_id.cmp(&b.ev_id)));
    out
}

/// Cumulative session share against user share, starting at `(0, 0)`.
///
/// `freqs` must be sorted most active first, as returned by
/// [`user_frequency_distribution`].
pub fn pareto_curve(freqs: &[UserFrequency]) -> Vec<ParetoPoint> {
    let total: usize = freqs.iter().map(|f| f.sessions).sum();
    if total == 0 {
        return Vec::new();
    }
    let users = freqs.len() as f64;

    let mut cumulative = 0usize;
    let mut curve = Vec::with_capacity(freqs.len() + 1);
    curve.push(ParetoPoint {
        user_share: 0.0,
        session_share: 0.0,
    });
    for (i, f) in freqs.iter().enumerate() {
        cumulative += f.sessions;
        curve.push(ParetoPoint {
            user_share: (i + 1) as f64 / users,
            session_share: cumulative as f64 / total as f64,
        });
    }
    curve
}

/// Smallest share of users that accounts for at least `fraction` of the
/// sessions. `fraction` is clamped to `[0, 1]`.
pub fn users_share_for(freqs: &[UserFrequency], fraction: f64) -> f64 {
    let fraction = fraction.clamp(0.0, 1.0);
    pareto_curve(freqs)
        .into_iter()
        .find(|p| p.session_share + 1e-12 >= fraction)
        .map(|p| p.user_share)
        .unwrap_or(0.0)
}

/// Distribution of the number of sessions per user.
pub fn sessions_per_user_histogram(freqs: &[UserFrequency], bins: usize) -> Vec<HistogramBin> {
    let counts: Vec<f64> = freqs.iter().map(|f| f.sessions as f64).collect();
    histogram(&counts, bins)
}

// ── Engagement ────────────────────────────────────────────────────────────────

/// Top users listed in an [`Engagement`] report.
pub const TOP_USERS: usize = 10;

/// Engagement report over a set of sessions.
#[derive(Debug, Clone, Serialize)]
pub struct Engagement {
    pub users: usize,
    pub sessions_per_user: Summary,
    pub top_users: Vec<UserFrequency>,
    /// Share of users accounting for 80 % of sessions.
    pub users_for_80_percent: f64,
    pub pareto: Vec<ParetoPoint>,
    pub sessions_per_user_histogram: Vec<HistogramBin>,
}

impl Engagement {
    pub fn compute(sessions: &[ChargingSession], bins: usize) -> Self {
        let freqs = user_frequency_distribution(sessions);
        let counts: Vec<f64> = freqs.iter().map(|f| f.sessions as f64).collect();

        Self {
            users: freqs.len(),
            sessions_per_user: Summary::from_values(&counts),
            top_users: freqs.iter().take(TOP_USERS).cloned().collect(),
            users_for_80_percent: users_share_for(&freqs, 0.8),
            pareto: pareto_curve(&freqs),
            sessions_per_user_histogram: sessions_per_user_histogram(&freqs, bins),
        }
    }
}
