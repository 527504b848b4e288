//! `define_port_error!`: error enums for the domain ports.
//!
//! Each variant gets a snake-case constructor taking `impl Into<_>` for
//! every field, in declaration order. A variant followed by `; retryable`
//! reports `true` from the generated `is_retryable`, which callers use to
//! decide whether a failed call may be repeated.

macro_rules! define_port_error {
    (@retryable retryable) => { true };
    (@retryable) => { false };

    (
        $(#[$outer:meta])*
        pub enum $name:ident {
            $(
                $(#[$variant_meta:meta])*
                $variant:ident $( { $($field:ident : $ty:ty),* $(,)? } )? => $message:expr
                $( ; $marker:ident )?
            ),* $(,)?
        }
    ) => {
        $(#[$outer])*
        #[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
        pub enum $name {
            $(
                $(#[$variant_meta])*
                #[error($message)]
                $variant $( { $($field : $ty),* } )?,
            )*
        }

        ::paste::paste! {
            impl $name {
                $(
                    #[doc = concat!("Build [`", stringify!($name), "::", stringify!($variant), "`].")]
                    pub fn [<$variant:snake>]($( $($field: impl Into<$ty>),* )?) -> Self {
                        Self::$variant $( { $($field: $field.into()),* } )?
                    }
                )*

                /// Whether the failure is transient, so repeating the call
                /// may succeed.
                pub fn is_retryable(&self) -> bool {
                    match self {
                        $( Self::$variant { .. } => define_port_error!(@retryable $($marker)?), )*
                    }
                }
            }
        }
    };
}

pub(crate) use define_port_error;
