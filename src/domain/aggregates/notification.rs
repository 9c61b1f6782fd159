//! Notification Aggregate (stock alerts and the fields the admin inbox reads)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    pub kind: NotificationKind,
    pub severity: Severity,
    pub title: String,
    pub message: String,
    pub product_id: Option<String>,
    pub variant_id: Option<String>,
    pub metadata: AlertMetadata,
    pub is_read: bool,
    pub action_required: bool,
    pub action_taken: bool,
    pub action_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertMetadata {
    pub stock_level: Option<u32>,
    pub threshold: Option<u32>,
    pub sku: Option<String>,
    pub product_name: Option<String>,
    pub triggered_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind { OutOfStock, LowStock, Order, System }

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity { Low, Medium, High, Critical }

macro_rules! str_enum {
    ($ty:ty { $($variant:ident => $s:literal),+ $(,)? }) => {
        impl $ty {
            pub fn as_str(&self) -> &'static str { match self { $(Self::$variant => $s),+ } }
        }
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
        }
        impl FromStr for $ty {
            type Err = String;
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s { $($s => Ok(Self::$variant),)+ other => Err(format!("unknown {}: {other}", stringify!($ty))) }
            }
        }
    };
}

str_enum!(NotificationKind { OutOfStock => "out_of_stock", LowStock => "low_stock", Order => "order", System => "system" });
str_enum!(Severity { Low => "low", Medium => "medium", High => "high", Critical => "critical" });

impl Notification {
    /// A fresh, unresolved stock alert for one variant.
    pub fn stock_alert(
        kind: NotificationKind,
        product_id: &str,
        variant_id: &str,
        title: impl Into<String>,
        message: impl Into<String>,
        metadata: AlertMetadata,
    ) -> Self {
        let now = Utc::now();
        let severity = match kind { NotificationKind::OutOfStock => Severity::High, _ => Severity::Medium };
        Self {
            id: Uuid::now_v7().to_string(), kind, severity, title: title.into(), message: message.into(),
            product_id: Some(product_id.to_string()), variant_id: Some(variant_id.to_string()), metadata,
            is_read: false, action_required: true, action_taken: false, action_at: None,
            created_at: now, updated_at: now,
        }
    }

    pub fn is_open(&self) -> bool { !self.action_taken }

    /// Folds a repeated trigger into this unresolved alert.
    pub fn refresh_from(&mut self, newer: &Notification) {
        self.message = newer.message.clone();
        self.title = newer.title.clone();
        self.metadata = newer.metadata.clone();
        self.is_read = false;
        self.updated_at = Utc::now();
    }

    pub fn mark_read(&mut self) { self.is_read = true; self.updated_at = Utc::now(); }

    pub fn mark_action_taken(&mut self) {
        let now = Utc::now();
        self.action_taken = true;
        self.action_at = Some(now);
        self.is_read = true;
        self.updated_at = now;
    }
}

/// Filter for the admin notification listing.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationFilter {
    pub kind: Option<NotificationKind>,
    pub severity: Option<Severity>,
    pub is_read: Option<bool>,
    pub action_taken: Option<bool>,
}

impl NotificationFilter {
    pub fn matches(&self, n: &Notification) -> bool {
        self.kind.map_or(true, |k| n.kind == k)
            && self.severity.map_or(true, |s| n.severity == s)
            && self.is_read.map_or(true, |r| n.is_read == r)
            && self.action_taken.map_or(true, |a| n.action_taken == a)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alert(kind: NotificationKind, level: u32) -> Notification {
        Notification::stock_alert(kind, "P1", "V1", "Out of stock", format!("level {level}"), AlertMetadata { stock_level: Some(level), ..Default::default() })
    }

    #[test]
    fn test_refresh_keeps_identity() {
        let mut first = alert(NotificationKind::LowStock, 4);
        first.mark_read();
        let second = alert(NotificationKind::LowStock, 2);
        let id = first.id.clone();
        first.refresh_from(&second);
        assert_eq!(first.id, id);
        assert_eq!(first.metadata.stock_level, Some(2));
        assert!(!first.is_read);
    }

    #[test]
    fn test_action_taken_closes_alert() {
        let mut n = alert(NotificationKind::OutOfStock, 0);
        assert_eq!(n.severity, Severity::High);
        assert!(n.is_open());
        n.mark_action_taken();
        assert!(!n.is_open());
        assert!(n.action_at.is_some());
    }

    #[test]
    fn test_filter() {
        let n = alert(NotificationKind::LowStock, 3);
        assert!(NotificationFilter::default().matches(&n));
        assert!(NotificationFilter { kind: Some(NotificationKind::LowStock), is_read: Some(false), ..Default::default() }.matches(&n));
        assert!(!NotificationFilter { severity: Some(Severity::High), ..Default::default() }.matches(&n));
    }

    #[test]
    fn test_kind_parses() {
        assert_eq!("low_stock".parse::<NotificationKind>().unwrap(), NotificationKind::LowStock);
        assert!("bogus".parse::<Severity>().is_err());
    }
}
