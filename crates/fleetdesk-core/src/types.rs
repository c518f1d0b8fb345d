use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::DeskError;

/// `{label, value}` pair served to clients for select boxes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SelectOption {
    pub label: &'static str,
    pub value: &'static str,
}

/// Generates `as_str`, `all`, `options`, `Display`, `FromStr` and the SQLite
/// conversions for a fieldless enum stored as a snake_case string.
macro_rules! string_enum {
    ($name:ident, $invalid:literal, { $($variant:ident => ($value:literal, $label:literal)),+ $(,)? }) => {
        impl $name {
            pub fn all() -> &'static [$name] {
                &[$($name::$variant),+]
            }

            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $value),+
                }
            }

            pub fn label(self) -> &'static str {
                match self {
                    $($name::$variant => $label),+
                }
            }

            pub fn options() -> Vec<SelectOption> {
                Self::all()
                    .iter()
                    .map(|v| SelectOption { label: v.label(), value: v.as_str() })
                    .collect()
            }

            pub fn values() -> Vec<&'static str> {
                Self::all().iter().map(|v| v.as_str()).collect()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = DeskError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($value => Ok($name::$variant),)+
                    _ => Err(DeskError::BadRequest(format!($invalid, s))),
                }
            }
        }

        impl ToSql for $name {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.as_str()))
            }
        }

        impl FromSql for $name {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                value
                    .as_str()?
                    .parse()
                    .map_err(|e: DeskError| FromSqlError::Other(Box::new(e)))
            }
        }
    };
}

// ---------------------------------------------------------------------------
// DeliveryStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Pending,
    Assigned,
    InProgress,
    Delivered,
    Cancelled,
}

string_enum!(DeliveryStatus, "invalid delivery status: {}", {
    Pending => ("pending", "Pending"),
    Assigned => ("assigned", "Assigned"),
    InProgress => ("in_progress", "In Progress"),
    Delivered => ("delivered", "Delivered"),
    Cancelled => ("cancelled", "Cancelled"),
});

impl DeliveryStatus {
    /// Forward-only lifecycle. Terminal states accept nothing.
    pub fn can_transition_to(self, to: DeliveryStatus) -> bool {
        use DeliveryStatus::*;
        match self {
            Pending => matches!(to, Assigned | InProgress | Delivered | Cancelled),
            Assigned => matches!(to, InProgress | Delivered | Cancelled),
            InProgress => matches!(to, Delivered | Cancelled),
            Delivered | Cancelled => false,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, DeliveryStatus::Delivered | DeliveryStatus::Cancelled)
    }
}

// ---------------------------------------------------------------------------
// DeliveryType / DeliveryMode
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryType {
    Order,
    Return,
    Pickup,
    Exchange,
    Document,
    Package,
    Food,
    Medicine,
    Grocery,
    Other,
}

string_enum!(DeliveryType, "invalid delivery type: {}", {
    Order => ("order", "Order Delivery"),
    Return => ("return", "Return"),
    Pickup => ("pickup", "Pickup"),
    Exchange => ("exchange", "Exchange"),
    Document => ("document", "Document Delivery"),
    Package => ("package", "Package Delivery"),
    Food => ("food", "Food Delivery"),
    Medicine => ("medicine", "Medicine Delivery"),
    Grocery => ("grocery", "Grocery Delivery"),
    Other => ("other", "Other"),
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMode {
    Bike,
    Motorcycle,
    Car,
    Van,
    Truck,
    Walk,
    Bicycle,
    Scooter,
    PublicTransport,
    Other,
}

string_enum!(DeliveryMode, "invalid delivery mode: {}", {
    Bike => ("bike", "Bike"),
    Motorcycle => ("motorcycle", "Motorcycle"),
    Car => ("car", "Car"),
    Van => ("van", "Van"),
    Truck => ("truck", "Truck"),
    Walk => ("walk", "Walking"),
    Bicycle => ("bicycle", "Bicycle"),
    Scooter => ("scooter", "Scooter"),
    PublicTransport => ("public_transport", "Public Transport"),
    Other => ("other", "Other"),
});

// ---------------------------------------------------------------------------
// CompanyAddressType
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompanyAddressType {
    Warehouse,
    PickupPoint,
    Office,
    DistributionCenter,
    Store,
    Other,
}

string_enum!(CompanyAddressType, "invalid address type: {}", {
    Warehouse => ("warehouse", "Warehouse"),
    PickupPoint => ("pickup_point", "Pickup Point"),
    Office => ("office", "Office"),
    DistributionCenter => ("distribution_center", "Distribution Center"),
    Store => ("store", "Store"),
    Other => ("other", "Other"),
});

// ---------------------------------------------------------------------------
// OwnerKind / ActorKind
// ---------------------------------------------------------------------------

/// Owner of a polymorphic saved address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OwnerKind {
    Company,
    Customer,
    DeliveryMan,
}

string_enum!(OwnerKind, "invalid address owner: {}", {
    Company => ("company", "Company"),
    Customer => ("customer", "Customer"),
    DeliveryMan => ("delivery_man", "Delivery Man"),
});

/// Who performed a status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorKind {
    CompanyUser,
    DeliveryMan,
    System,
}

string_enum!(ActorKind, "invalid actor: {}", {
    CompanyUser => ("company_user", "Company User"),
    DeliveryMan => ("delivery_man", "Delivery Man"),
    System => ("system", "System"),
});

/// Authenticated actor attached to a write, used for status logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub kind: ActorKind,
    pub id: Option<i64>,
}

impl Actor {
    pub fn company_user(id: i64) -> Self {
        Self {
            kind: ActorKind::CompanyUser,
            id: Some(id),
        }
    }

    pub fn delivery_man(id: i64) -> Self {
        Self {
            kind: ActorKind::DeliveryMan,
            id: Some(id),
        }
    }

    pub fn system() -> Self {
        Self {
            kind: ActorKind::System,
            id: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use DeliveryStatus::*;

    #[test]
    fn transition_table() {
        assert!(Pending.can_transition_to(Assigned));
        assert!(Pending.can_transition_to(InProgress));
        assert!(Pending.can_transition_to(Delivered));
        assert!(Pending.can_transition_to(Cancelled));
        assert!(!Pending.can_transition_to(Pending));

        assert!(Assigned.can_transition_to(InProgress));
        assert!(Assigned.can_transition_to(Delivered));
        assert!(Assigned.can_transition_to(Cancelled));
        assert!(!Assigned.can_transition_to(Pending));
        assert!(!Assigned.can_transition_to(Assigned));

        assert!(InProgress.can_transition_to(Delivered));
        assert!(InProgress.can_transition_to(Cancelled));
        assert!(!InProgress.can_transition_to(Assigned));
        assert!(!InProgress.can_transition_to(Pending));
    }

    #[test]
    fn terminal_states_accept_nothing() {
        for from in [Delivered, Cancelled] {
            assert!(from.is_terminal());
            for to in DeliveryStatus::all() {
                assert!(!from.can_transition_to(*to), "{from} -> {to}");
            }
        }
    }

    #[test]
    fn status_parses_snake_case() {
        assert_eq!("in_progress".parse::<DeliveryStatus>().unwrap(), InProgress);
        assert!("shipped".parse::<DeliveryStatus>().is_err());
        assert_eq!(InProgress.to_string(), "in_progress");
    }

    #[test]
    fn options_use_labels() {
        let opts = DeliveryMode::options();
        assert_eq!(opts.len(), 10);
        assert_eq!(
            opts[5],
            SelectOption {
                label: "Walking",
                value: "walk"
            }
        );
        assert_eq!(DeliveryType::values()[0], "order");
    }

    #[test]
    fn serde_matches_display() {
        let json = serde_json::to_string(&CompanyAddressType::PickupPoint).unwrap();
        assert_eq!(json, "\"pickup_point\"");
        assert_eq!(CompanyAddressType::PickupPoint.to_string(), "pickup_point");
    }
}
