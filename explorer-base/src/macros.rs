#[macro_export]
/// Shortcut for aborting a joinhandle and then awaiting and discarding its
/// result
macro_rules! cancel_task {
    ($task:ident) => {
        #[allow(unused_must_use)]
        {
            let t = $task.into_inner();
            t.abort();
            t.await;
        }
    };
}

#[macro_export]
/// Shortcut for implementing agent traits
macro_rules! impl_as_ref_core {
    ($agent:ident) => {
        impl AsRef<explorer_base::ExplorerAgentCore> for $agent {
            fn as_ref(&self) -> &explorer_base::ExplorerAgentCore {
                &self.core
            }
        }
    };
}

/// Export this so they don't need to import paste.
#[doc(hidden)]
pub use paste;

#[macro_export]
/// Declare a new settings block
///
/// This macro declares a settings struct for an agent. The new settings block
/// contains a [`crate::Settings`] and any other specified attributes. The
/// settings are loaded from the config files and the `EXPLORER_BASE__` and
/// `EXPLORER_{NAME}__` env vars, see [`crate::settings`].
///
/// ### Usage
///
/// ```ignore
/// decl_settings!(Tracker {
///    #[serde(default)]
///    max_wait_confirmations: u64,
/// });
/// ```
macro_rules! decl_settings {
    (
        $name:ident {
            $($(#[$tags:meta])* $prop:ident: $type:ty,)*
        }
    ) => {
        explorer_base::macros::paste::paste! {
            #[derive(Debug, serde::Deserialize)]
            #[serde(rename_all = "camelCase")]
            #[doc = "Settings for `" $name]
            pub struct [<$name Settings>] {
                #[serde(flatten)]
                pub(crate) base: explorer_base::Settings,
                $(
                    $(#[$tags])*
                    pub(crate) $prop: $type,
                )*
            }

            impl std::ops::Deref for [<$name Settings>] {
                type Target = explorer_base::Settings;

                fn deref(&self) -> &Self::Target {
                    &self.base
                }
            }

            impl AsRef<explorer_base::Settings> for [<$name Settings>] {
                fn as_ref(&self) -> &explorer_base::Settings {
                    &self.base
                }
            }

            impl explorer_base::LoadableFromSettings for [<$name Settings>] {
                fn load() -> eyre::Result<Self> {
                    explorer_base::load_settings_object(stringify!($name))
                }
            }
        }
    }
}
