use crate::utils::error::RetinaError;
use crate::Result;
use clap::ValueEnum;
use std::path::PathBuf;

/// Compute device requested on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum DevicePreference {
    /// CUDA when the execution provider is available, CPU otherwise
    #[default]
    Auto,
    Cpu,
    Cuda,
}

/// Settings shared by every subcommand, settable by flag or environment.
#[derive(Debug, Clone, clap::Args)]
pub struct ConfigArgs {
    /// Server bind address
    #[arg(long, env = "RETINA_BIND", default_value = "0.0.0.0:5000")]
    pub bind: String,

    /// ONNX export of the severity classifier
    #[arg(long, env = "RETINA_MODEL_PATH", default_value = "models/classifier.onnx")]
    pub model_path: PathBuf,

    /// Compute device preference
    #[arg(long, env = "RETINA_DEVICE", value_enum, default_value_t = DevicePreference::Auto)]
    pub device: DevicePreference,

    /// Scratch directory for uploaded images
    #[arg(long, env = "RETINA_UPLOAD_DIR", default_value = "uploads")]
    pub upload_dir: PathBuf,

    /// Directory holding the bundled front-end
    #[arg(long, env = "RETINA_STATIC_DIR", default_value = "frontend")]
    pub static_dir: PathBuf,

    /// Maximum upload size in megabytes
    #[arg(long, env = "RETINA_MAX_UPLOAD_MB", default_value_t = 16)]
    pub max_upload_mb: usize,

    /// Accepted upload extensions
    #[arg(
        long,
        env = "RETINA_ALLOWED_EXTENSIONS",
        value_delimiter = ',',
        default_value = "png,jpg,jpeg"
    )]
    pub allowed_extensions: Vec<String>,

    /// Number of ONNX Runtime intra-op threads
    #[arg(long)]
    pub intra_threads: Option<usize>,
}

impl Default for ConfigArgs {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:5000".to_string(),
            model_path: PathBuf::from("models/classifier.onnx"),
            device: DevicePreference::Auto,
            upload_dir: PathBuf::from("uploads"),
            static_dir: PathBuf::from("frontend"),
            max_upload_mb: 16,
            allowed_extensions: vec!["png".into(), "jpg".into(), "jpeg".into()],
            intra_threads: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Server bind address
    pub bind_addr: String,

    /// Checkpoint path
    pub model_path: PathBuf,

    /// Requested compute device
    pub device: DevicePreference,

    /// Scratch upload directory
    pub upload_dir: PathBuf,

    /// Static front-end directory
    pub static_dir: PathBuf,

    /// Lower-cased extensions accepted for upload
    pub allowed_extensions: Vec<String>,

    /// ONNX Runtime settings
    pub onnx_config: OnnxConfig,

    /// HTTP server settings
    pub server_config: ServerConfig,

    /// Image transform constants
    pub preprocess: PreprocessConfig,
}

#[derive(Debug, Clone)]
pub struct OnnxConfig {
    /// CPU threads
    pub intra_threads: usize,

    /// Graph optimization level
    pub optimization_level: i32,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Maximum request body size (bytes)
    pub max_request_size: usize,
}

/// Fixed transform matched to the network's training distribution.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct PreprocessConfig {
    /// Square input resolution
    pub image_size: u32,
    pub mean: [f32; 3],
    pub std: [f32; 3],
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            image_size: 224,
            mean: [0.485, 0.456, 0.406],
            std: [0.229, 0.224, 0.225],
        }
    }
}

impl Config {
    pub fn new(args: ConfigArgs) -> Result<Self> {
        if args.max_upload_mb == 0 {
            return Err(RetinaError::Config(
                "max upload size must be at least 1 MB".to_string(),
            ));
        }

        let allowed_extensions: Vec<String> = args
            .allowed_extensions
            .iter()
            .map(|ext| ext.trim().trim_start_matches('.').to_ascii_lowercase())
            .filter(|ext| !ext.is_empty())
            .collect();

        if allowed_extensions.is_empty() {
            return Err(RetinaError::Config(
                "at least one allowed extension is required".to_string(),
            ));
        }

        let cpu_cores = num_cpus::get();
        let onnx_config = OnnxConfig {
            intra_threads: args
                .intra_threads
                .unwrap_or((cpu_cores * 3 / 4).max(1)), // 75% of cores
            optimization_level: 3,
        };

        let server_config = ServerConfig {
            max_request_size: args.max_upload_mb * 1024 * 1024,
        };

        Ok(Self {
            bind_addr: args.bind,
            model_path: args.model_path,
            device: args.device,
            upload_dir: args.upload_dir,
            static_dir: args.static_dir,
            allowed_extensions,
            onnx_config,
            server_config,
            preprocess: PreprocessConfig::default(),
        })
    }

    /// Create the scratch upload directory if it doesn't exist.
    pub fn init_dirs(&self) -> Result<()> {
        std::fs::create_dir_all(&self.upload_dir)?;
        Ok(())
    }

    /// Whether `filename` carries one of the allowed extensions.
    pub fn is_allowed_file(&self, filename: &str) -> bool {
        match filename.rsplit_once('.') {
            Some((_, ext)) => {
                let ext = ext.to_ascii_lowercase();
                self.allowed_extensions.iter().any(|allowed| *allowed == ext)
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_service_contract() {
        let config = Config::new(ConfigArgs::default()).unwrap();
        assert_eq!(config.server_config.max_request_size, 16 * 1024 * 1024);
        assert_eq!(config.allowed_extensions, vec!["png", "jpg", "jpeg"]);
        assert_eq!(config.preprocess.image_size, 224);
        assert!(config.onnx_config.intra_threads >= 1);
    }

    #[test]
    fn extension_check_is_case_insensitive() {
        let config = Config::new(ConfigArgs::default()).unwrap();
        assert!(config.is_allowed_file("fundus.PNG"));
        assert!(config.is_allowed_file("scan.final.jpeg"));
        assert!(!config.is_allowed_file("animation.gif"));
        assert!(!config.is_allowed_file("no_extension"));
        assert!(!config.is_allowed_file("trailing."));
    }

    #[test]
    fn extensions_are_normalized() {
        let args = ConfigArgs {
            allowed_extensions: vec![".PNG".into(), " Tiff ".into()],
            ..ConfigArgs::default()
        };
        let config = Config::new(args).unwrap();
        assert_eq!(config.allowed_extensions, vec!["png", "tiff"]);
    }

    #[test]
    fn rejects_empty_extension_list() {
        let args = ConfigArgs {
            allowed_extensions: vec![" ".into()],
            ..ConfigArgs::default()
        };
        assert!(matches!(Config::new(args), Err(RetinaError::Config(_))));
    }

    #[derive(clap::Parser)]
    struct Cli {
        #[command(flatten)]
        args: ConfigArgs,
    }

    #[test]
    fn command_line_accepts_only_documented_flags() {
        use clap::Parser;

        let cli = Cli::try_parse_from([
            "retina-dr",
            "--device",
            "cpu",
            "--max-upload-mb",
            "8",
            "--allowed-extensions",
            "png,tif",
        ])
        .unwrap();
        let config = Config::new(cli.args).unwrap();
        assert_eq!(config.device, DevicePreference::Cpu);
        assert_eq!(config.server_config.max_request_size, 8 * 1024 * 1024);
        assert_eq!(config.allowed_extensions, vec!["png", "tif"]);

        assert!(Cli::try_parse_from(["retina-dr", "--dev"]).is_err());
    }
}
