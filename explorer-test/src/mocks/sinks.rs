#![allow(non_snake_case)]
#![allow(missing_docs)]

use async_trait::async_trait;
use mockall::*;

use explorer_core::*;

mock! {
    pub VaaNotifier {
        pub fn _notify(&self, vaa: &Vaa) -> ChainResult<()> {}
    }
}

impl std::fmt::Debug for MockVaaNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "MockVaaNotifier")
    }
}

#[async_trait]
impl VaaNotifier for MockVaaNotifier {
    async fn notify(&self, vaa: &Vaa) -> ChainResult<()> {
        self._notify(vaa)
    }
}

mock! {
    pub PriceSource {
        pub fn _usd_price(&self, coin_gecko_id: &str) -> ChainResult<Option<f64>> {}
    }
}

impl std::fmt::Debug for MockPriceSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "MockPriceSource")
    }
}

#[async_trait]
impl PriceSource for MockPriceSource {
    async fn usd_price(&self, coin_gecko_id: &str) -> ChainResult<Option<f64>> {
        self._usd_price(coin_gecko_id)
    }
}
