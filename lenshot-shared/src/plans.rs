/// Subscription plans and per-plan limits
///
/// Every user carries a plan identifier; the plan decides the monthly
/// capture allowance and the largest viewport a capture may request.
///
/// # Limits by Plan
///
/// | Plan | Monthly captures | Max width | Max height |
/// |---|---|---|---|
/// | free | 100 | 1920 | 1080 |
/// | starter | 1,000 | 2560 | 1440 |
/// | pro | 10,000 | 3840 | 2160 |
/// | enterprise | 100,000 | 7680 | 4320 |
///
/// # Example
///
/// ```
/// use lenshot_shared::plans::{Plan, PlanLimits};
///
/// let limits = PlanLimits::for_plan(Plan::Free);
/// assert_eq!(limits.monthly_captures, 100);
/// assert!(limits.max_width < 7680);
/// ```

use serde::{Deserialize, Serialize};

/// Subscription plan identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Plan {
    /// Free tier
    Free,

    /// Entry paid tier
    Starter,

    /// Professional tier
    Pro,

    /// Enterprise tier
    Enterprise,
}

impl Plan {
    /// Converts plan to its storage string
    pub fn as_str(&self) -> &'static str {
        match self {
            Plan::Free => "free",
            Plan::Starter => "starter",
            Plan::Pro => "pro",
            Plan::Enterprise => "enterprise",
        }
    }

    /// Parses a stored plan string, defaulting unknown values to free
    ///
    /// Unknown values fail closed to the most restrictive plan rather than
    /// erroring a request that already authenticated.
    pub fn from_str_or_free(s: &str) -> Self {
        match s {
            "starter" => Plan::Starter,
            "pro" => Plan::Pro,
            "enterprise" => Plan::Enterprise,
            _ => Plan::Free,
        }
    }

    /// All plans, in ascending order of allowance
    pub fn all() -> [Plan; 4] {
        [Plan::Free, Plan::Starter, Plan::Pro, Plan::Enterprise]
    }
}

/// Limits attached to a plan
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PlanLimits {
    /// Capture units per billing period (calendar month)
    pub monthly_captures: i32,

    /// Maximum capture viewport width in pixels
    pub max_width: i32,

    /// Maximum capture viewport height in pixels
    pub max_height: i32,

    /// Monthly price in USD cents (0 for free)
    pub price_cents: i64,
}

impl PlanLimits {
    /// Gets the limits for a plan
    pub fn for_plan(plan: Plan) -> Self {
        match plan {
            Plan::Free => PlanLimits {
                monthly_captures: 100,
                max_width: 1920,
                max_height: 1080,
                price_cents: 0,
            },
            Plan::Starter => PlanLimits {
                monthly_captures: 1_000,
                max_width: 2560,
                max_height: 1440,
                price_cents: 900,
            },
            Plan::Pro => PlanLimits {
                monthly_captures: 10_000,
                max_width: 3840,
                max_height: 2160,
                price_cents: 2900,
            },
            Plan::Enterprise => PlanLimits {
                monthly_captures: 100_000,
                max_width: 7680,
                max_height: 4320,
                price_cents: 19900,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_round_trip() {
        for plan in Plan::all() {
            assert_eq!(Plan::from_str_or_free(plan.as_str()), plan);
        }
    }

    #[test]
    fn test_unknown_plan_falls_back_to_free() {
        assert_eq!(Plan::from_str_or_free("platinum"), Plan::Free);
        assert_eq!(Plan::from_str_or_free(""), Plan::Free);
    }

    #[test]
    fn test_limits_are_monotonic() {
        let plans = Plan::all();
        for pair in plans.windows(2) {
            let lower = PlanLimits::for_plan(pair[0]);
            let upper = PlanLimits::for_plan(pair[1]);
            assert!(upper.monthly_captures > lower.monthly_captures);
            assert!(upper.max_width >= lower.max_width);
            assert!(upper.max_height >= lower.max_height);
        }
    }

    #[test]
    fn test_free_plan_limits() {
        let limits = PlanLimits::for_plan(Plan::Free);
        assert_eq!(limits.monthly_captures, 100);
        assert_eq!(limits.max_width, 1920);
        assert_eq!(limits.max_height, 1080);
        assert_eq!(limits.price_cents, 0);
    }
}
