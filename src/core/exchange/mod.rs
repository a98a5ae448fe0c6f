//! Upstream exchange clients: catalog REST, trading API and the live
//! order-book stream.

pub mod clob;
pub mod gamma;
pub mod messages;
pub mod stream;

pub use clob::{OrderResponse, PlaceOrderRequest, TradingAuth, TradingClient};
pub use gamma::{CatalogClient, Page, RawEvent, RawMarket, RawSeries, RawTag, RawToken};
pub use stream::{AssetProvider, BookStream, StreamConfig, StreamEvent};
