//! Entry point of the library.
//!
//! # Design
//! `LapostaClient` owns one `Pipeline` and hands out borrowed resource
//! clients (`campaigns()`, `members()`, ...). These are `Copy` wrappers
//! holding nothing but a resource name and a reference to the pipeline, so
//! creating one per call costs nothing and there is no instance cache.
//!
//! Every collaborator can be replaced through `LapostaClientBuilder`; the
//! defaults are the socket transport and the temp-file backed factories.

use std::sync::Arc;

use crate::api::{CampaignApi, FieldApi, ListApi, MemberApi, ReportApi, SegmentApi, WebhookApi};
use crate::config::Config;
use crate::error::Error;
use crate::http::factory::{
    DefaultRequestFactory, DefaultResponseFactory, DefaultUriFactory, RequestFactory, ResponseFactory,
    StreamFactory, TempStreamFactory, UriFactory,
};
use crate::http::transfer::{SocketTransferAdapter, TransferAdapter};
use crate::http::transport::{HttpClient, Transport};
use crate::pipeline::Pipeline;

#[derive(Debug, Clone)]
pub struct LapostaClient {
    pipeline: Pipeline,
    response_factory: Arc<dyn ResponseFactory>,
}

impl LapostaClient {
    /// A client with the default transport and factories.
    pub fn new(config: Config) -> Self {
        Self::builder(config).build()
    }

    /// A default client configured from `LAPOSTA_*` environment variables.
    pub fn from_env() -> Result<Self, Error> {
        Ok(Self::new(Config::from_env()?))
    }

    pub fn builder(config: Config) -> LapostaClientBuilder {
        LapostaClientBuilder::new(config)
    }

    pub fn config(&self) -> &Config {
        self.pipeline.config()
    }

    pub fn api_key(&self) -> &str {
        self.pipeline.config().api_key()
    }

    /// Use a different API key for all following requests.
    pub fn set_api_key(&mut self, api_key: impl Into<String>) {
        self.pipeline.config_mut().set_api_key(api_key);
    }

    pub fn api_base_url(&self) -> String {
        self.pipeline.config().api_base_url()
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub fn http_client(&self) -> &Arc<dyn HttpClient> {
        self.pipeline.http_client()
    }

    pub fn request_factory(&self) -> &Arc<dyn RequestFactory> {
        self.pipeline.request_factory()
    }

    pub fn response_factory(&self) -> &Arc<dyn ResponseFactory> {
        &self.response_factory
    }

    pub fn stream_factory(&self) -> &Arc<dyn StreamFactory> {
        self.pipeline.stream_factory()
    }

    pub fn uri_factory(&self) -> &Arc<dyn UriFactory> {
        self.pipeline.uri_factory()
    }

    pub fn campaigns(&self) -> CampaignApi<'_> {
        CampaignApi::new(&self.pipeline)
    }

    pub fn fields(&self) -> FieldApi<'_> {
        FieldApi::new(&self.pipeline)
    }

    pub fn lists(&self) -> ListApi<'_> {
        ListApi::new(&self.pipeline)
    }

    pub fn members(&self) -> MemberApi<'_> {
        MemberApi::new(&self.pipeline)
    }

    pub fn reports(&self) -> ReportApi<'_> {
        ReportApi::new(&self.pipeline)
    }

    pub fn segments(&self) -> SegmentApi<'_> {
        SegmentApi::new(&self.pipeline)
    }

    pub fn webhooks(&self) -> WebhookApi<'_> {
        WebhookApi::new(&self.pipeline)
    }
}

/// Builder for a `LapostaClient` with custom collaborators.
///
/// Anything left unset gets the default. A custom `http_client` replaces the
/// whole transport, in which case `transfer_adapter` and the configured
/// timeouts are not used.
#[derive(Debug)]
pub struct LapostaClientBuilder {
    config: Config,
    http_client: Option<Arc<dyn HttpClient>>,
    transfer_adapter: Option<Arc<dyn TransferAdapter>>,
    request_factory: Option<Arc<dyn RequestFactory>>,
    response_factory: Option<Arc<dyn ResponseFactory>>,
    stream_factory: Option<Arc<dyn StreamFactory>>,
    uri_factory: Option<Arc<dyn UriFactory>>,
}

impl LapostaClientBuilder {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            http_client: None,
            transfer_adapter: None,
            request_factory: None,
            response_factory: None,
            stream_factory: None,
            uri_factory: None,
        }
    }

    pub fn http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(client);
        self
    }

    /// Transfer primitive for the default transport.
    pub fn transfer_adapter(mut self, adapter: Arc<dyn TransferAdapter>) -> Self {
        self.transfer_adapter = Some(adapter);
        self
    }

    pub fn request_factory(mut self, factory: Arc<dyn RequestFactory>) -> Self {
        self.request_factory = Some(factory);
        self
    }

    pub fn response_factory(mut self, factory: Arc<dyn ResponseFactory>) -> Self {
        self.response_factory = Some(factory);
        self
    }

    pub fn stream_factory(mut self, factory: Arc<dyn StreamFactory>) -> Self {
        self.stream_factory = Some(factory);
        self
    }

    pub fn uri_factory(mut self, factory: Arc<dyn UriFactory>) -> Self {
        self.uri_factory = Some(factory);
        self
    }

    pub fn build(self) -> LapostaClient {
        let stream_factory: Arc<dyn StreamFactory> = self
            .stream_factory
            .unwrap_or_else(|| Arc::new(TempStreamFactory::default()));
        let response_factory: Arc<dyn ResponseFactory> =
            self.response_factory.unwrap_or_else(|| Arc::new(DefaultResponseFactory));
        let uri_factory: Arc<dyn UriFactory> = self.uri_factory.unwrap_or_else(|| Arc::new(DefaultUriFactory));
        let request_factory: Arc<dyn RequestFactory> = self
            .request_factory
            .unwrap_or_else(|| Arc::new(DefaultRequestFactory::new(Arc::clone(&stream_factory))));

        let http_client = match self.http_client {
            Some(client) => client,
            None => {
                let adapter = self
                    .transfer_adapter
                    .unwrap_or_else(|| Arc::new(SocketTransferAdapter::new()));
                let mut transport = Transport::new(adapter, Arc::clone(&stream_factory), Arc::clone(&response_factory));
                transport.set_connection_timeout(self.config.connect_timeout());
                transport.set_request_timeout(self.config.timeout());
                Arc::new(transport)
            }
        };

        LapostaClient {
            pipeline: Pipeline::new(self.config, http_client, request_factory, stream_factory, uri_factory),
            response_factory,
        }
    }
}
