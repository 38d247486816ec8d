//! Static offering catalogue

use serde::Serialize;

pub const PREMIUM_OFFERING: &str = "premium";
pub const MONTHLY_PACKAGE: &str = "monthly";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PackageType {
    Monthly,
}

/// A purchasable package
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Package {
    pub identifier: String,
    pub package_type: PackageType,
    pub title: String,
    pub description: String,
    pub price_amount: f64,
    pub currency_code: String,
}

impl Package {
    /// Display price, e.g. `$49.99`
    pub fn price_string(&self) -> String {
        let symbol = match self.currency_code.as_str() {
            "USD" => "$",
            "EUR" => "€",
            "GBP" => "£",
            _ => "",
        };
        if symbol.is_empty() {
            format!("{:.2} {}", self.price_amount, self.currency_code)
        } else {
            format!("{}{:.2}", symbol, self.price_amount)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Offering {
    pub identifier: String,
    pub description: String,
    pub packages: Vec<Package>,
}

impl Offering {
    pub fn package(&self, identifier: &str) -> Option<&Package> {
        self.packages.iter().find(|p| p.identifier == identifier)
    }

    /// The catalogue shown on the paywall until a store integration exists
    pub fn premium() -> Self {
        Self {
            identifier: PREMIUM_OFFERING.to_string(),
            description: "Premium Trading Signals".to_string(),
            packages: vec![Package {
                identifier: MONTHLY_PACKAGE.to_string(),
                package_type: PackageType::Monthly,
                title: "SignalDesk Premium".to_string(),
                description: "Access to all AI trading signals".to_string(),
                price_amount: 49.99,
                currency_code: "USD".to_string(),
            }],
        }
    }
}
