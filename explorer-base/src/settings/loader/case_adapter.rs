use std::fmt::Debug;

use config::{ConfigError, Map, Source, Value};
use convert_case::{Case, Casing};
use derive_new::new;
use itertools::Itertools;

/// Re-cases the keys of a config source, e.g. the lowercased keys of env
/// vars into the camelCase used by the settings structs.
#[derive(Clone, Debug, new)]
pub struct CaseAdapter<S> {
    inner: S,
    casing: Case,
}

impl<S> Source for CaseAdapter<S>
where
    S: Source + Clone + Send + Sync + 'static,
{
    fn clone_into_box(&self) -> Box<dyn Source + Send + Sync> {
        Box::new(self.clone())
    }

    fn collect(&self) -> Result<Map<String, Value>, ConfigError> {
        self.inner.collect().map(|config| {
            config
                .into_iter()
                .map(|(k, v)| (recase_key(self.casing, &k), v))
                .collect()
        })
    }
}

/// Recase each `.` separated component of a key
fn recase_key(case: Case, key: &str) -> String {
    key.split('.').map(|s| s.to_case(case)).join(".")
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn recases_every_component() {
        assert_eq!(
            recase_key(Case::Camel, "chains.ethereum.rpc_url"),
            "chains.ethereum.rpcUrl"
        );
        assert_eq!(
            recase_key(Case::Camel, "fetch_missing_vaas_interval"),
            "fetchMissingVaasInterval"
        );
    }
}
