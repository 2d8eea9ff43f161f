//! 命令行：`run` / `upgrade` / `recover` / `active` / `version`。

use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;

/// 激活服务器端口。
pub const ACTIVATION_PORT: u16 = 60004;

#[derive(Debug, Parser)]
#[command(name = "edge-gateway", version, about = "工业物联网边缘网关")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// 启动网关
    Run {
        /// 启动时加载的资源文件（覆盖 EDGE_RESOURCES_FILE）
        #[arg(long)]
        config: Option<PathBuf>,
        /// 数据库连接串（覆盖 EDGE_DATABASE_URL）
        #[arg(long)]
        db: Option<String>,
    },
    /// 升级前备份资源文件
    #[command(hide = true)]
    Upgrade {
        #[arg(long)]
        upgrade: bool,
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// 从备份恢复资源文件
    #[command(hide = true)]
    Recover {
        #[arg(long)]
        recover: bool,
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// 输出激活请求
    #[command(hide = true)]
    Active {
        #[arg(short = 'H', long = "host", default_value = "activation.hootrhino.com")]
        host: String,
        #[arg(short = 'U', long = "user", default_value = "rhilex")]
        user: String,
        #[arg(short = 'P', long = "password")]
        password: String,
        #[arg(long, default_value = "00000000001")]
        sn: String,
        #[arg(long = "iface")]
        iface: Option<String>,
        #[arg(long)]
        mac: Option<String>,
    },
    /// 打印版本
    Version,
}

/// 激活请求，密码不回显。
#[derive(Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ActivationRequest {
    pub url: String,
    pub sn: String,
    pub iface: String,
    pub mac: String,
    pub username: String,
    pub password: String,
}

impl ActivationRequest {
    pub fn new(
        host: &str,
        sn: &str,
        iface: Option<&str>,
        mac: Option<&str>,
        user: &str,
        password: &str,
    ) -> Result<Self, String> {
        for (name, value) in [("host", host), ("sn", sn), ("user", user), ("password", password)] {
            if value.trim().is_empty() {
                return Err(format!("missing '{}' parameter", name));
            }
        }
        Ok(Self {
            url: format!("http://{}:{}/api/v1/activation", host, ACTIVATION_PORT),
            sn: sn.to_string(),
            iface: iface.unwrap_or_default().to_string(),
            mac: mac.unwrap_or_default().to_string(),
            username: user.to_string(),
            password: "*".repeat(password.chars().count()),
        })
    }
}

/// `[os-arch-version]`
pub fn version_string() -> String {
    format!(
        "[{}-{}-v{}]",
        std::env::consts::OS,
        std::env::consts::ARCH,
        env!("CARGO_PKG_VERSION")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run_with_overrides() {
        let cli = Cli::try_parse_from([
            "edge-gateway",
            "run",
            "--config",
            "resources.json",
            "--db",
            "postgres://localhost/edge",
        ])
        .unwrap();
        match cli.command {
            Command::Run { config, db } => {
                assert_eq!(config, Some(PathBuf::from("resources.json")));
                assert_eq!(db.as_deref(), Some("postgres://localhost/edge"));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_active_short_flags() {
        let cli =
            Cli::try_parse_from(["edge-gateway", "active", "-H", "10.0.0.1", "-U", "admin", "-P", "secret"])
                .unwrap();
        let Command::Active {
            host,
            user,
            password,
            sn,
            ..
        } = cli.command
        else {
            panic!("active expected");
        };
        let request = ActivationRequest::new(&host, &sn, None, None, &user, &password).unwrap();
        assert_eq!(request.url, "http://10.0.0.1:60004/api/v1/activation");
        assert_eq!(request.username, "admin");
        assert_eq!(request.password, "******");
    }

    #[test]
    fn test_argument_errors() {
        assert!(Cli::try_parse_from(["edge-gateway"]).is_err());
        assert!(Cli::try_parse_from(["edge-gateway", "active"]).is_err());
        assert!(Cli::try_parse_from(["edge-gateway", "launch"]).is_err());
        assert!(ActivationRequest::new("h", "", None, None, "u", "p").is_err());
    }

    #[test]
    fn test_version_string() {
        let version = version_string();
        assert!(version.starts_with('['));
        assert!(version.contains(env!("CARGO_PKG_VERSION")));
    }
}
