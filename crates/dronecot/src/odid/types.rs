//! Enumerated fields of the Open Drone ID message set.

use std::fmt;

/// Declares a `u32`-backed enum with an `Unknown` fallback.
macro_rules! odid_enum {
    (
        $(#[$meta:meta])*
        $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident = $value:literal => $label:literal, )+
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $( $(#[$vmeta])* $variant, )+
            /// A value the standard does not define.
            Unknown(u32),
        }

        impl From<u32> for $name {
            fn from(value: u32) -> Self {
                match value {
                    $( $value => Self::$variant, )+
                    other => Self::Unknown(other),
                }
            }
        }

        impl $name {
            /// The raw value as transmitted.
            #[must_use]
            pub fn code(self) -> u32 {
                match self {
                    $( Self::$variant => $value, )+
                    Self::Unknown(other) => other,
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                match self {
                    $( Self::$variant => f.write_str($label), )+
                    Self::Unknown(other) => write!(f, "unknown ({other})"),
                }
            }
        }
    };
}

odid_enum! {
    /// Kind of unmanned aircraft.
    UaType {
        /// No type declared.
        None = 0 => "none",
        /// Fixed-wing aeroplane.
        Aeroplane = 1 => "aeroplane",
        /// Helicopter or multirotor.
        HelicopterOrMultirotor = 2 => "helicopter or multirotor",
        /// Gyroplane.
        Gyroplane = 3 => "gyroplane",
        /// Hybrid lift (fixed wing that can take off vertically).
        HybridLift = 4 => "hybrid lift",
        /// Ornithopter.
        Ornithopter = 5 => "ornithopter",
        /// Glider.
        Glider = 6 => "glider",
        /// Kite.
        Kite = 7 => "kite",
        /// Free balloon.
        FreeBalloon = 8 => "free balloon",
        /// Captive balloon.
        CaptiveBalloon = 9 => "captive balloon",
        /// Airship.
        Airship = 10 => "airship",
        /// Free fall or parachute (unpowered).
        FreeFallParachute = 11 => "free fall/parachute",
        /// Rocket.
        Rocket = 12 => "rocket",
        /// Tethered powered aircraft.
        TetheredPoweredAircraft = 13 => "tethered powered aircraft",
        /// Ground obstacle.
        GroundObstacle = 14 => "ground obstacle",
        /// Other.
        Other = 15 => "other",
    }
}

odid_enum! {
    /// Format of the identifier carried in a Basic ID message.
    IdType {
        /// No identifier.
        None = 0 => "none",
        /// ANSI/CTA-2063-A serial number.
        SerialNumber = 1 => "serial number",
        /// Registration ID issued by a civil aviation authority.
        CaaRegistrationId = 2 => "CAA registration ID",
        /// UTM-assigned UUID.
        UtmAssignedUuid = 3 => "UTM assigned UUID",
        /// Specific session ID.
        SpecificSessionId = 4 => "specific session ID",
    }
}

odid_enum! {
    /// Operational status reported in a Location message.
    OperationalStatus {
        /// Undeclared.
        Undeclared = 0 => "undeclared",
        /// On the ground.
        Ground = 1 => "ground",
        /// Airborne.
        Airborne = 2 => "airborne",
        /// Emergency.
        Emergency = 3 => "emergency",
        /// The Remote ID system itself has failed.
        RemoteIdSystemFailure = 4 => "remote ID system failure",
    }
}

odid_enum! {
    /// Reference for the height field of a Location message.
    HeightType {
        /// Height above the takeoff location.
        AboveTakeoff = 0 => "above takeoff",
        /// Height above ground level.
        AboveGroundLevel = 1 => "above ground level",
    }
}

odid_enum! {
    /// Source of the operator position in a System message.
    OperatorLocationType {
        /// Takeoff location.
        TakeOff = 0 => "takeoff",
        /// Live GNSS position of the operator.
        LiveGnss = 1 => "live GNSS",
        /// Fixed, pre-programmed location.
        Fixed = 2 => "fixed",
    }
}

odid_enum! {
    /// Classification scheme used by a System message.
    ClassificationType {
        /// No classification declared.
        Undeclared = 0 => "undeclared",
        /// European Union category and class.
        EuropeanUnion = 1 => "EU",
    }
}

impl UaType {
    /// Whether the aircraft flies on fixed wings.
    #[must_use]
    pub fn is_fixed_wing(self) -> bool {
        matches!(self, Self::Aeroplane | Self::Glider)
    }
}

impl IdType {
    /// Whether the identifier is printable text rather than raw bytes.
    #[must_use]
    pub fn is_textual(self) -> bool {
        matches!(self, Self::SerialNumber | Self::CaaRegistrationId)
    }
}
