//! CLI argument parsing and conversion into a pipeline configuration

use std::num::NonZeroU32;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use ganda_core::{Header, Input, PipelineConfig, ResponseBodyMode};

#[derive(Debug, Parser)]
#[command(name = "ganda")]
#[command(version, about = "make http requests in parallel")]
#[command(override_usage = "<urls/requests on stdin> | ganda [options]  OR  ganda [options] [file of requests]")]
#[command(
    long_about = "Pipe urls to ganda over stdin or give it a file with one url per line for it to make http requests to each url in parallel."
)]
pub struct Cli {
    /// File of requests, reads standard input when omitted
    pub requests: Option<PathBuf>,

    /// Save response bodies to files in the specified directory instead of
    /// streaming them to stdout
    #[arg(short = 'o', long)]
    pub output: Option<PathBuf>,

    /// HTTP request method to use
    #[arg(short = 'X', long = "request", default_value = "GET")]
    pub request: String,

    /// Headers to send with every request, can be used multiple times
    /// (gzip and keep-alive are already there)
    #[arg(short = 'H', long = "header")]
    pub header: Vec<String>,

    /// Number of concurrent workers that will be making requests
    #[arg(short = 'W', long = "workers", default_value_t = 1)]
    pub workers: usize,

    /// Number of concurrent workers that will be processing responses,
    /// if not specified will be same as --workers
    #[arg(long = "response-workers")]
    pub response_workers: Option<usize>,

    /// Length of hashed subdirectory name to put saved files when using -o;
    /// use 2 for > 5k urls, 4 for > 5M urls
    #[arg(short = 'S', long = "subdir-length", default_value_t = 0)]
    pub subdir_length: i32,

    /// Number of milliseconds to wait for a connection to be established
    /// before timeout
    #[arg(long = "connect-timeout-millis", default_value_t = 10_000)]
    pub connect_timeout_millis: u64,

    /// Max number of requests to process per second, default is unlimited
    #[arg(short = 't', long = "throttle")]
    pub throttle: Option<u32>,

    /// Skip verification of https certificates
    #[arg(short = 'k', long)]
    pub insecure: bool,

    /// Omit showing response code for each url, only output response bodies
    #[arg(short = 's', long)]
    pub silent: bool,

    /// Add color to success/warn messages
    #[arg(long)]
    pub color: bool,

    /// Emit result in a JSON envelope with url, code, body, and context
    /// fields, assumes result is valid json
    #[arg(short = 'J', long = "json-envelope")]
    pub json_envelope: bool,

    /// Transforms the body of the response. Values: 'raw' (unchanged),
    /// 'base64', 'discard' (don't emit body), 'escaped' (JSON escaped
    /// string), 'sha256'
    #[arg(short = 'B', long = "response-body", default_value = "raw")]
    pub response_body: String,

    /// Max number of retries on transient errors (5XX status codes or
    /// timeouts) to attempt
    #[arg(long = "retry", default_value_t = 0)]
    pub retry: u32,

    /// Base number of milliseconds to wait before retrying a request,
    /// exponential backoff is used for retries
    #[arg(long = "base-retry-millis", default_value_t = 1_000)]
    pub base_retry_millis: u64,

    /// Printf-style template with %s placeholders filled from the tokens
    /// after each url to form the request body
    #[arg(long = "data-template")]
    pub data_template: Option<String>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Starts an echo server
    Echoserver {
        /// Port number to start the echo server on
        #[arg(long, default_value_t = 8080)]
        port: u16,

        /// Number of milliseconds to delay responding
        #[arg(long = "delay-millis", default_value_t = 0)]
        delay_millis: u64,
    },
}

impl Cli {
    /// Convert parsed flags into the pipeline configuration
    pub fn into_config(self) -> anyhow::Result<PipelineConfig> {
        let mut request_headers = Vec::with_capacity(self.header.len());
        for raw in &self.header {
            let header = Header::parse(raw).map_err(anyhow::Error::msg)?;
            request_headers.push(header);
        }

        let response_body: ResponseBodyMode = self
            .response_body
            .parse()
            .map_err(anyhow::Error::msg)?;

        let config = PipelineConfig {
            input: self.requests.map(Input::File).unwrap_or(Input::Stdin),
            request_method: self.request,
            request_headers,
            data_template: self.data_template,
            request_workers: self.workers,
            response_workers: self.response_workers.unwrap_or(self.workers),
            connect_timeout: Duration::from_millis(self.connect_timeout_millis),
            retries: self.retry,
            base_retry_delay: Duration::from_millis(self.base_retry_millis),
            throttle_per_second: self.throttle.and_then(NonZeroU32::new),
            insecure: self.insecure,
            output_directory: self.output,
            subdir_length: self.subdir_length,
            response_body,
            json_envelope: self.json_envelope,
            silent: self.silent,
            color: self.color,
        };

        config.validate().context("invalid flags")?;
        Ok(config)
    }
}
