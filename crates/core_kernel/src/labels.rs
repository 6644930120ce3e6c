//! String-labelled enums
//!
//! Status and option enums are stored as lowercase text columns and travel
//! as the same strings in JSON. [`string_enum!`] generates the enum with its
//! `as_str`, `Display`, `FromStr` and serde implementations from a single
//! variant/label table.

/// Declares an enum whose variants map one-to-one onto string labels
///
/// ```rust
/// core_kernel::string_enum! {
///     /// Delivery channel
///     pub enum Channel {
///         Email => "email",
///         Sms => "sms",
///     }
/// }
///
/// assert_eq!(Channel::Sms.as_str(), "sms");
/// assert_eq!("email".parse::<Channel>().unwrap(), Channel::Email);
/// assert!("fax".parse::<Channel>().is_err());
/// ```
#[macro_export]
macro_rules! string_enum {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident => $label:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ::serde::Serialize, ::serde::Deserialize)]
        $vis enum $name {
            $( $(#[$vmeta])* #[serde(rename = $label)] $variant ),+
        }

        impl $name {
            /// Every variant, in declaration order
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// Returns the stored label
            pub fn as_str(&self) -> &'static str {
                match self {
                    $( $name::$variant => $label ),+
                }
            }
        }

        impl ::std::fmt::Display for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl ::std::str::FromStr for $name {
            type Err = $crate::CoreError;

            fn from_str(s: &str) -> ::std::result::Result<Self, Self::Err> {
                match s {
                    $( $label => Ok($name::$variant), )+
                    other => Err($crate::CoreError::validation(format!(
                        "'{}' is not a valid {}",
                        other,
                        stringify!($name)
                    ))),
                }
            }
        }
    };
}
