//! Package pricing using decimal arithmetic.
//!
//! Tribute packages are sold as a base [`Tier`] plus optional [`AddOn`]s.
//! Prices are whole US dollars today but are carried as [`Decimal`] so that
//! amounts never pass through floating point.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A USD amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct Price(Decimal);

impl Price {
    #[must_use]
    pub const fn new(amount: Decimal) -> Self {
        Self(amount)
    }

    #[must_use]
    pub fn from_dollars(dollars: i64) -> Self {
        Self(Decimal::from(dollars))
    }

    #[must_use]
    pub const fn amount(&self) -> Decimal {
        self.0
    }

    /// Amount in cents, as payment processors expect.
    #[must_use]
    pub fn cents(&self) -> Option<i64> {
        use rust_decimal::prelude::ToPrimitive;
        (self.0 * Decimal::ONE_HUNDRED).round().to_i64()
    }

    /// Format for display, e.g. `$1,250.00`.
    #[must_use]
    pub fn display(&self) -> String {
        let rounded = self.0.round_dp(2);
        let negative = rounded.is_sign_negative();
        let text = format!("{:.2}", rounded.abs());
        let (whole, frac) = text.split_once('.').unwrap_or((text.as_str(), "00"));

        let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
        for (i, c) in whole.chars().enumerate() {
            if i > 0 && (whole.len() - i) % 3 == 0 {
                grouped.push(',');
            }
            grouped.push(c);
        }

        let sign = if negative { "-" } else { "" };
        format!("{sign}${grouped}.{frac}")
    }
}

impl std::ops::Add for Price {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self(self.0 + rhs.0)
    }
}

impl std::iter::Sum for Price {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), |acc, p| acc + p)
    }
}

/// Base package tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    /// Memorial card, mounted enlargement and QR code.
    Basic,
    /// Everything in basic plus the digital tribute experience.
    Premium,
}

impl Tier {
    pub const ALL: [Self; 2] = [Self::Basic, Self::Premium];

    #[must_use]
    pub fn price(self) -> Price {
        match self {
            Self::Basic => Price::from_dollars(250),
            Self::Premium => Price::from_dollars(350),
        }
    }

    #[must_use]
    pub const fn id(self) -> &'static str {
        match self {
            Self::Basic => "basic",
            Self::Premium => "premium",
        }
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Basic => "Basic",
            Self::Premium => "Premium",
        }
    }

    #[must_use]
    pub fn from_id(id: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.id() == id)
    }
}

/// Optional extra on top of a tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddOn {
    AiEffects,
}

impl AddOn {
    pub const ALL: [Self; 1] = [Self::AiEffects];

    #[must_use]
    pub fn price(self) -> Price {
        match self {
            Self::AiEffects => Price::from_dollars(100),
        }
    }

    #[must_use]
    pub const fn id(self) -> &'static str {
        match self {
            Self::AiEffects => "ai_effects",
        }
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::AiEffects => "Heaven AI Video Effects",
        }
    }

    #[must_use]
    pub fn from_id(id: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|a| a.id() == id)
    }
}

/// Total for a tier id plus add-on ids.
///
/// An unknown tier prices the whole order at zero; unknown add-ons contribute
/// nothing.
#[must_use]
pub fn calculate_total<S: AsRef<str>>(tier_id: &str, add_on_ids: &[S]) -> Price {
    let Some(tier) = Tier::from_id(tier_id) else {
        return Price::default();
    };
    let extras: Price = add_on_ids
        .iter()
        .filter_map(|id| AddOn::from_id(id.as_ref()))
        .map(AddOn::price)
        .sum();
    tier.price() + extras
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_calculate_total() {
        assert_eq!(calculate_total::<&str>("basic", &[]), Price::from_dollars(250));
        assert_eq!(
            calculate_total("premium", &["ai_effects"]),
            Price::from_dollars(450)
        );
        assert_eq!(
            calculate_total("premium", &["ai_effects", "unknown"]),
            Price::from_dollars(450)
        );
        assert_eq!(calculate_total("platinum", &["ai_effects"]), Price::default());
    }

    #[test]
    fn test_display_and_cents() {
        assert_eq!(Price::from_dollars(250).display(), "$250.00");
        assert_eq!(Price::from_dollars(1250).display(), "$1,250.00");
        assert_eq!(Price::new(Decimal::new(1999, 2)).cents(), Some(1999));
    }
}
