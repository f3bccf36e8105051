//! Geyser wire messages and client.
//!
//! Mirrors the subset of `geyser.proto` (package `geyser`) this watcher
//! uses. Tag numbers match upstream so the messages interoperate with any
//! Yellowstone-compatible server; fields the watcher never reads are left
//! out and skipped on decode.

#![allow(missing_docs, clippy::pedantic, clippy::nursery)]

use std::collections::HashMap;

// =============================================================================
// Requests
// =============================================================================

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SubscribeRequest {
    #[prost(map = "string, message", tag = "1")]
    pub accounts: HashMap<String, SubscribeRequestFilterAccounts>,
    #[prost(map = "string, message", tag = "2")]
    pub slots: HashMap<String, SubscribeRequestFilterSlots>,
    #[prost(map = "string, message", tag = "3")]
    pub transactions: HashMap<String, SubscribeRequestFilterTransactions>,
    #[prost(map = "string, message", tag = "4")]
    pub blocks: HashMap<String, SubscribeRequestFilterBlocks>,
    #[prost(map = "string, message", tag = "5")]
    pub blocks_meta: HashMap<String, SubscribeRequestFilterBlocksMeta>,
    #[prost(enumeration = "CommitmentLevel", optional, tag = "6")]
    pub commitment: Option<i32>,
    #[prost(message, repeated, tag = "7")]
    pub accounts_data_slice: Vec<SubscribeRequestAccountsDataSlice>,
    #[prost(map = "string, message", tag = "8")]
    pub entry: HashMap<String, SubscribeRequestFilterEntry>,
    #[prost(message, optional, tag = "9")]
    pub ping: Option<SubscribeRequestPing>,
    #[prost(map = "string, message", tag = "10")]
    pub transactions_status: HashMap<String, SubscribeRequestFilterTransactions>,
    #[prost(uint64, optional, tag = "11")]
    pub from_slot: Option<u64>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SubscribeRequestFilterAccounts {
    #[prost(string, repeated, tag = "2")]
    pub account: Vec<String>,
    #[prost(string, repeated, tag = "3")]
    pub owner: Vec<String>,
    #[prost(bool, optional, tag = "5")]
    pub nonempty_txn_signature: Option<bool>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SubscribeRequestFilterSlots {
    #[prost(bool, optional, tag = "1")]
    pub filter_by_commitment: Option<bool>,
    #[prost(bool, optional, tag = "2")]
    pub interslot_updates: Option<bool>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SubscribeRequestFilterTransactions {
    #[prost(bool, optional, tag = "1")]
    pub vote: Option<bool>,
    #[prost(bool, optional, tag = "2")]
    pub failed: Option<bool>,
    #[prost(string, optional, tag = "5")]
    pub signature: Option<String>,
    #[prost(string, repeated, tag = "3")]
    pub account_include: Vec<String>,
    #[prost(string, repeated, tag = "4")]
    pub account_exclude: Vec<String>,
    #[prost(string, repeated, tag = "6")]
    pub account_required: Vec<String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SubscribeRequestFilterBlocks {
    #[prost(string, repeated, tag = "1")]
    pub account_include: Vec<String>,
    #[prost(bool, optional, tag = "2")]
    pub include_transactions: Option<bool>,
    #[prost(bool, optional, tag = "3")]
    pub include_accounts: Option<bool>,
    #[prost(bool, optional, tag = "4")]
    pub include_entries: Option<bool>,
}

#[derive(Clone, PartialEq, Eq, ::prost::Message)]
pub struct SubscribeRequestFilterBlocksMeta {}

#[derive(Clone, PartialEq, Eq, ::prost::Message)]
pub struct SubscribeRequestFilterEntry {}

#[derive(Clone, PartialEq, Eq, ::prost::Message)]
pub struct SubscribeRequestAccountsDataSlice {
    #[prost(uint64, tag = "1")]
    pub offset: u64,
    #[prost(uint64, tag = "2")]
    pub length: u64,
}

#[derive(Clone, PartialEq, Eq, ::prost::Message)]
pub struct SubscribeRequestPing {
    #[prost(int32, tag = "1")]
    pub id: i32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum CommitmentLevel {
    Processed = 0,
    Confirmed = 1,
    Finalized = 2,
}

// =============================================================================
// Updates
// =============================================================================

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SubscribeUpdate {
    #[prost(string, repeated, tag = "1")]
    pub filters: Vec<String>,
    #[prost(oneof = "subscribe_update::UpdateOneof", tags = "4, 6, 9")]
    pub update_oneof: Option<subscribe_update::UpdateOneof>,
}

pub mod subscribe_update {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum UpdateOneof {
        #[prost(message, tag = "4")]
        Transaction(super::SubscribeUpdateTransaction),
        #[prost(message, tag = "6")]
        Ping(super::SubscribeUpdatePing),
        #[prost(message, tag = "9")]
        Pong(super::SubscribeUpdatePong),
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SubscribeUpdateTransaction {
    #[prost(message, optional, tag = "1")]
    pub transaction: Option<SubscribeUpdateTransactionInfo>,
    #[prost(uint64, tag = "2")]
    pub slot: u64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SubscribeUpdateTransactionInfo {
    #[prost(bytes = "vec", tag = "1")]
    pub signature: Vec<u8>,
    #[prost(bool, tag = "2")]
    pub is_vote: bool,
    #[prost(message, optional, tag = "3")]
    pub transaction: Option<Transaction>,
    #[prost(uint64, tag = "5")]
    pub index: u64,
}

/// `solana.storage.ConfirmedBlock.Transaction`, account keys only.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Transaction {
    #[prost(bytes = "vec", repeated, tag = "1")]
    pub signatures: Vec<Vec<u8>>,
    #[prost(message, optional, tag = "2")]
    pub message: Option<Message>,
}

/// `solana.storage.ConfirmedBlock.Message`, account keys only.
#[derive(Clone, PartialEq, Eq, ::prost::Message)]
pub struct Message {
    #[prost(bytes = "vec", repeated, tag = "2")]
    pub account_keys: Vec<Vec<u8>>,
}

#[derive(Clone, PartialEq, Eq, ::prost::Message)]
pub struct SubscribeUpdatePing {}

#[derive(Clone, PartialEq, Eq, ::prost::Message)]
pub struct SubscribeUpdatePong {
    #[prost(int32, tag = "1")]
    pub id: i32,
}

// =============================================================================
// Client
// =============================================================================

/// Client for the `geyser.Geyser` service, `Subscribe` method only.
pub mod geyser_client {
    #![allow(clippy::wildcard_imports)]

    use tonic::codegen::*;

    #[derive(Debug, Clone)]
    pub struct GeyserClient<T> {
        inner: tonic::client::Grpc<T>,
    }

    impl<T> GeyserClient<T>
    where
        T: tonic::client::GrpcService<tonic::body::Body>,
        T::Error: Into<StdError>,
        T::ResponseBody: Body<Data = Bytes> + std::marker::Send + 'static,
        <T::ResponseBody as Body>::Error: Into<StdError> + std::marker::Send,
    {
        pub fn new(inner: T) -> Self {
            let inner = tonic::client::Grpc::new(inner);
            Self { inner }
        }

        pub fn with_interceptor<F>(
            inner: T,
            interceptor: F,
        ) -> GeyserClient<InterceptedService<T, F>>
        where
            F: tonic::service::Interceptor,
            T::ResponseBody: Default,
            T: tonic::codegen::Service<
                    http::Request<tonic::body::Body>,
                    Response = http::Response<
                        <T as tonic::client::GrpcService<tonic::body::Body>>::ResponseBody,
                    >,
                >,
            <T as tonic::codegen::Service<http::Request<tonic::body::Body>>>::Error:
                Into<StdError> + std::marker::Send + std::marker::Sync,
        {
            GeyserClient::new(InterceptedService::new(inner, interceptor))
        }

        /// Limits the maximum size of a decoded message.
        #[must_use]
        pub fn max_decoding_message_size(mut self, limit: usize) -> Self {
            self.inner = self.inner.max_decoding_message_size(limit);
            self
        }

        pub async fn subscribe(
            &mut self,
            request: impl tonic::IntoStreamingRequest<Message = super::SubscribeRequest>,
        ) -> std::result::Result<
            tonic::Response<tonic::codec::Streaming<super::SubscribeUpdate>>,
            tonic::Status,
        > {
            self.inner
                .ready()
                .await
                .map_err(|e| tonic::Status::unknown(format!("Service was not ready: {}", e.into())))?;
            let codec = tonic_prost::ProstCodec::default();
            let path = http::uri::PathAndQuery::from_static("/geyser.Geyser/Subscribe");
            let mut req = request.into_streaming_request();
            req.extensions_mut()
                .insert(GrpcMethod::new("geyser.Geyser", "Subscribe"));
            self.inner.streaming(req, path, codec).await
        }
    }
}
