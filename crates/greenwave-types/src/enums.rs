//! Enumeration types for the Greenwave traffic control plane.
//!
//! Signal-light states and approaches, the session connection lifecycle,
//! and the object classes reported by the detection feed.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

// ---------------------------------------------------------------------------
// Connection lifecycle
// ---------------------------------------------------------------------------

/// State of the session to the external simulation engine.
///
/// Transitions follow the session state machine: `Disconnected` ->
/// `Connecting` -> `Connected` -> `Disconnecting` -> `Disconnected`.
/// No step or light command may be issued unless the status is
/// [`ConnectionStatus::Connected`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub enum ConnectionStatus {
    /// No session exists.
    #[default]
    Disconnected,
    /// A session open is in flight.
    Connecting,
    /// The session is live; steps and light commands are allowed.
    Connected,
    /// A session close is in flight.
    Disconnecting,
}

// ---------------------------------------------------------------------------
// Signal lights
// ---------------------------------------------------------------------------

/// State of a single traffic light head.
///
/// The optimizer emits only terminal `Red`/`Green` states; `Yellow` exists
/// in the model for the clearance interval a production deployment must
/// schedule before a green assignment takes effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub enum LightState {
    /// Stop.
    Red,
    /// Clearance interval.
    Yellow,
    /// Proceed.
    Green,
}

/// One of the four approach directions of the controlled junction.
///
/// The light set is fixed at session start: one head per approach.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS,
)]
#[ts(export, export_to = "bindings/")]
pub enum Approach {
    /// Northern approach (`tl_north`).
    North,
    /// Southern approach (`tl_south`).
    South,
    /// Eastern approach (`tl_east`).
    East,
    /// Western approach (`tl_west`).
    West,
}

impl Approach {
    /// All four approaches in a stable order.
    pub const ALL: [Self; 4] = [Self::North, Self::South, Self::East, Self::West];

    /// The axis this approach belongs to.
    pub const fn axis(self) -> Axis {
        match self {
            Self::North | Self::South => Axis::NorthSouth,
            Self::East | Self::West => Axis::EastWest,
        }
    }

    /// The wire identifier of this approach's light head.
    pub const fn light_id(self) -> &'static str {
        match self {
            Self::North => "tl_north",
            Self::South => "tl_south",
            Self::East => "tl_east",
            Self::West => "tl_west",
        }
    }

    /// Parse a wire light identifier back into an approach.
    ///
    /// Returns `None` for identifiers outside the fixed four-light set.
    pub fn from_light_id(id: &str) -> Option<Self> {
        match id {
            "tl_north" => Some(Self::North),
            "tl_south" => Some(Self::South),
            "tl_east" => Some(Self::East),
            "tl_west" => Some(Self::West),
            _ => None,
        }
    }
}

/// Grouping of approaches into the two opposing lane groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub enum Axis {
    /// The north-south lane group.
    NorthSouth,
    /// The east-west lane group.
    EastWest,
}

impl Axis {
    /// The opposing axis.
    pub const fn opposing(self) -> Self {
        match self {
            Self::NorthSouth => Self::EastWest,
            Self::EastWest => Self::NorthSouth,
        }
    }

    /// The two approaches forming this axis.
    pub const fn approaches(self) -> [Approach; 2] {
        match self {
            Self::NorthSouth => [Approach::North, Approach::South],
            Self::EastWest => [Approach::East, Approach::West],
        }
    }
}

// ---------------------------------------------------------------------------
// Detection feed
// ---------------------------------------------------------------------------

/// Object class reported by the detection feed.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS,
)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "snake_case")]
pub enum ObjectClass {
    /// Passenger car.
    Car,
    /// Truck or lorry.
    Truck,
    /// Bus.
    Bus,
    /// Motorcycle.
    Motorcycle,
    /// Bicycle.
    Bicycle,
    /// Pedestrian.
    Pedestrian,
    /// Emergency vehicle (ambulance, fire, police).
    EmergencyVehicle,
}

impl ObjectClass {
    /// Whether this class counts toward vehicle traffic density.
    ///
    /// Bicycles and pedestrians are tracked but do not contribute to
    /// the vehicle density classification.
    pub const fn is_vehicle(self) -> bool {
        matches!(self, Self::Car | Self::Truck | Self::Bus | Self::Motorcycle)
    }
}

/// Coarse traffic density classification derived from detection counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "lowercase")]
pub enum TrafficDensity {
    /// No detected vehicles.
    #[default]
    Low,
    /// Fewer than ten detected vehicles.
    Medium,
    /// Ten or more detected vehicles.
    High,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn approach_axis_partition() {
        assert_eq!(Approach::North.axis(), Axis::NorthSouth);
        assert_eq!(Approach::South.axis(), Axis::NorthSouth);
        assert_eq!(Approach::East.axis(), Axis::EastWest);
        assert_eq!(Approach::West.axis(), Axis::EastWest);
    }

    #[test]
    fn light_id_round_trip() {
        for approach in Approach::ALL {
            assert_eq!(Approach::from_light_id(approach.light_id()), Some(approach));
        }
        assert_eq!(Approach::from_light_id("tl_up"), None);
    }

    #[test]
    fn axis_opposing_is_involutive() {
        assert_eq!(Axis::NorthSouth.opposing(), Axis::EastWest);
        assert_eq!(Axis::EastWest.opposing().opposing(), Axis::EastWest);
    }

    #[test]
    fn vehicle_classes() {
        assert!(ObjectClass::Car.is_vehicle());
        assert!(ObjectClass::Truck.is_vehicle());
        assert!(ObjectClass::Bus.is_vehicle());
        assert!(ObjectClass::Motorcycle.is_vehicle());
        assert!(!ObjectClass::Bicycle.is_vehicle());
        assert!(!ObjectClass::Pedestrian.is_vehicle());
        assert!(!ObjectClass::EmergencyVehicle.is_vehicle());
    }

    #[test]
    fn object_class_serde_uses_snake_case() {
        let json = serde_json::to_string(&ObjectClass::EmergencyVehicle).unwrap();
        assert_eq!(json, "\"emergency_vehicle\"");
    }
}
