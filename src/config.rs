use clap::Parser;
use url::Url;

/// Gateway configuration from command-line arguments, environment variables,
/// and an optional `.env` file.
#[derive(Debug, Clone, Parser)]
#[command(name = "rag-gateway")]
#[command(about = "Streaming gateway fronting a retrieval-augmented generation pipeline with Ollama- and OpenAI-compatible APIs")]
#[command(version)]
pub struct Config {
    /// Server port to listen on
    #[arg(short, long, env = "PORT", default_value = "8000")]
    pub port: u16,

    /// Server host to bind to
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Upstream Ollama-compatible generation service URL
    #[arg(long, env = "LLM_SERVER_URL", default_value = "http://localhost:11434")]
    pub upstream_url: String,

    /// Model name that routes to the augmented generation pipeline
    #[arg(long, env = "RAG_MODEL_NAME", default_value = "rag-assistant:latest")]
    pub rag_model_name: String,

    /// Model name advertised for the upstream generation service
    #[arg(long, env = "LLM_MODEL_NAME", default_value = "gemma3:27b-it-q4_K_M")]
    pub upstream_model_name: String,

    /// Timeout for proxied upstream calls, in seconds
    #[arg(long, env = "PROXY_TIMEOUT_SECS", default_value = "120")]
    pub proxy_timeout_secs: u64,

    /// End-to-end deadline for pipeline invocations, in seconds
    #[arg(long, env = "REQUEST_TIMEOUT_SECS", default_value = "120")]
    pub request_timeout_secs: u64,

    /// Words per chunk when segmenting a complete answer into a stream
    #[arg(long, env = "STREAM_CHUNK_WORDS", default_value = "1")]
    pub stream_chunk_words: usize,

    /// Cosmetic delay between segmented chunks, in milliseconds (0 disables)
    #[arg(long, env = "STREAM_CHUNK_DELAY_MS", default_value = "30")]
    pub stream_chunk_delay_ms: u64,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, env = "RUST_LOG", default_value = "info")]
    pub log_level: String,
}

impl Config {
    /// Parse configuration, load `.env` if present, initialize logging, and
    /// validate. Exits the process on invalid configuration.
    pub fn parse_args() -> Self {
        let _ = dotenv::dotenv();

        let config = Self::parse();
        config.setup_logging();

        if let Err(err) = config.validate() {
            eprintln!("Configuration validation failed: {}", err);
            std::process::exit(1);
        }

        config
    }

    /// Minimal configuration for tests.
    pub fn for_test() -> Self {
        Self {
            port: 8000,
            host: "127.0.0.1".to_string(),
            upstream_url: "http://localhost:11434".to_string(),
            rag_model_name: "rag-assistant:latest".to_string(),
            upstream_model_name: "gemma3:27b-it-q4_K_M".to_string(),
            proxy_timeout_secs: 120,
            request_timeout_secs: 120,
            stream_chunk_words: 1,
            stream_chunk_delay_ms: 0,
            log_level: "info".to_string(),
        }
    }

    fn setup_logging(&self) {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(&self.log_level)
            .with_target(false)
            .try_init();
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.port == 0 {
            return Err("Port cannot be 0. Please specify a valid port number (1-65535).".to_string());
        }

        if self.host.is_empty() {
            return Err("Host cannot be empty.".to_string());
        }

        if self.upstream_url.is_empty() {
            return Err("Upstream URL cannot be empty.".to_string());
        }
        match Url::parse(&self.upstream_url) {
            Ok(url) => {
                if !["http", "https"].contains(&url.scheme()) {
                    return Err(format!(
                        "Invalid URL scheme '{}'. Only 'http' and 'https' are supported.",
                        url.scheme()
                    ));
                }
                if url.host().is_none() {
                    return Err(
                        "Upstream URL must include a host (e.g., 'http://localhost:11434')."
                            .to_string(),
                    );
                }
            }
            Err(err) => {
                return Err(format!(
                    "Invalid upstream URL '{}': {}.",
                    self.upstream_url, err
                ));
            }
        }

        if self.rag_model_name.is_empty() {
            return Err("RAG model name cannot be empty.".to_string());
        }
        if self.rag_model_name == self.upstream_model_name {
            return Err(format!(
                "RAG model name and upstream model name must differ (both are '{}').",
                self.rag_model_name
            ));
        }

        if self.proxy_timeout_secs == 0 {
            return Err("Proxy timeout must be greater than 0 seconds.".to_string());
        }
        if self.request_timeout_secs == 0 {
            return Err("Request timeout must be greater than 0 seconds.".to_string());
        }

        if self.stream_chunk_words == 0 {
            return Err("Stream chunk size must be at least one word.".to_string());
        }

        let valid_log_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_log_levels.contains(&self.log_level.as_str())
            && !self.log_level.contains('=')
        {
            return Err(format!(
                "Invalid log level '{}'. Valid options are: {}",
                self.log_level,
                valid_log_levels.join(", ")
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_validates() {
        assert!(Config::for_test().validate().is_ok());
    }

    #[test]
    fn rejects_zero_port() {
        let mut config = Config::for_test();
        config.port = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_bad_upstream_scheme() {
        let mut config = Config::for_test();
        config.upstream_url = "ftp://example.com".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_colliding_model_names() {
        let mut config = Config::for_test();
        config.upstream_model_name = config.rag_model_name.clone();
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_zero_chunk_words() {
        let mut config = Config::for_test();
        config.stream_chunk_words = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn accepts_env_filter_log_directives() {
        let mut config = Config::for_test();
        config.log_level = "rag_gateway=debug".to_string();
        assert!(config.validate().is_ok());
    }
}
