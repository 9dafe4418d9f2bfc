//! Command-line parsing for the `safemon-server` binary.

pub const DEFAULT_CONFIG_PATH: &str = "config/server.toml";

pub const USAGE: &str = "\
Usage:
  safemon-server [config.toml]                                              Start the server
  safemon-server add-domain <config.toml> <hostname> [notes] [category_id]  Register or reactivate a domain
  safemon-server remove-domain <config.toml> <domain_id>                    Deactivate a domain
  safemon-server list-domains <config.toml>                                 List active domains
  safemon-server show-domain <config.toml> <hostname>                       Show one domain by hostname
  safemon-server add-category <config.toml> <name> [#color]                 Create a category
  safemon-server list-categories <config.toml>                              List categories
  safemon-server update-category <config.toml> <id> [--name N] [--color C]  Rename or recolour a category
  safemon-server delete-category <config.toml> <id>                         Delete a category, unassigning its domains
  safemon-server scan <config.toml>                                         Run one scan cycle and print the result
  safemon-server test-notify <config.toml>                                  Verify the bot and send a test message";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Serve {
        config_path: String,
    },
    AddDomain {
        config_path: String,
        hostname: String,
        notes: String,
        category_id: Option<String>,
    },
    RemoveDomain {
        config_path: String,
        id: String,
    },
    ListDomains {
        config_path: String,
    },
    ShowDomain {
        config_path: String,
        hostname: String,
    },
    AddCategory {
        config_path: String,
        name: String,
        color: Option<String>,
    },
    ListCategories {
        config_path: String,
    },
    UpdateCategory {
        config_path: String,
        id: String,
        name: Option<String>,
        color: Option<String>,
    },
    DeleteCategory {
        config_path: String,
        id: String,
    },
    Scan {
        config_path: String,
    },
    TestNotify {
        config_path: String,
    },
    Help,
}

impl Command {
    /// Whether this command runs the long-lived server.
    pub fn is_server(&self) -> bool {
        matches!(self, Command::Serve { .. })
    }
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum UsageError {
    #[error("missing argument: {0}")]
    Missing(&'static str),

    #[error("unknown option '{0}'")]
    UnknownOption(String),

    #[error("update-category needs --name or --color")]
    NothingToUpdate,
}

fn required(args: &[String], idx: usize, what: &'static str) -> Result<String, UsageError> {
    args.get(idx).cloned().ok_or(UsageError::Missing(what))
}

fn optional(args: &[String], idx: usize) -> Option<String> {
    args.get(idx).filter(|s| !s.is_empty()).cloned()
}

/// Parses the arguments that follow the program name.
pub fn parse_args(args: &[String]) -> Result<Command, UsageError> {
    let config = || required(args, 1, "<config.toml>");

    let command = match args.first().map(String::as_str) {
        None => Command::Serve {
            config_path: DEFAULT_CONFIG_PATH.to_string(),
        },
        Some("--help" | "-h" | "help") => Command::Help,
        Some("add-domain") => Command::AddDomain {
            config_path: config()?,
            hostname: required(args, 2, "<hostname>")?,
            notes: args.get(3).cloned().unwrap_or_default(),
            category_id: optional(args, 4),
        },
        Some("remove-domain") => Command::RemoveDomain {
            config_path: config()?,
            id: required(args, 2, "<domain_id>")?,
        },
        Some("list-domains") => Command::ListDomains {
            config_path: config()?,
        },
        Some("show-domain") => Command::ShowDomain {
            config_path: config()?,
            hostname: required(args, 2, "<hostname>")?,
        },
        Some("add-category") => Command::AddCategory {
            config_path: config()?,
            name: required(args, 2, "<name>")?,
            color: optional(args, 3),
        },
        Some("list-categories") => Command::ListCategories {
            config_path: config()?,
        },
        Some("update-category") => {
            let config_path = config()?;
            let id = required(args, 2, "<category_id>")?;
            let mut name = None;
            let mut color = None;
            let mut rest = args[3..].iter();
            while let Some(flag) = rest.next() {
                match flag.as_str() {
                    "--name" => name = Some(rest.next().cloned().ok_or(UsageError::Missing("--name <name>"))?),
                    "--color" => color = Some(rest.next().cloned().ok_or(UsageError::Missing("--color <#color>"))?),
                    other => return Err(UsageError::UnknownOption(other.to_string())),
                }
            }
            if name.is_none() && color.is_none() {
                return Err(UsageError::NothingToUpdate);
            }
            Command::UpdateCategory {
                config_path,
                id,
                name,
                color,
            }
        }
        Some("delete-category") => Command::DeleteCategory {
            config_path: config()?,
            id: required(args, 2, "<category_id>")?,
        },
        Some("scan") => Command::Scan {
            config_path: config()?,
        },
        Some("test-notify") => Command::TestNotify {
            config_path: config()?,
        },
        Some(flag) if flag.starts_with("--") => return Err(UsageError::UnknownOption(flag.to_string())),
        Some(path) => Command::Serve {
            config_path: path.to_string(),
        },
    };
    Ok(command)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Command, UsageError> {
        let args: Vec<String> = args.iter().map(|s| s.to_string()).collect();
        parse_args(&args)
    }

    #[test]
    fn no_arguments_serve_the_default_config() {
        assert_eq!(
            parse(&[]).unwrap(),
            Command::Serve {
                config_path: DEFAULT_CONFIG_PATH.to_string()
            }
        );
        assert_eq!(
            parse(&["/etc/safemon.toml"]).unwrap(),
            Command::Serve {
                config_path: "/etc/safemon.toml".to_string()
            }
        );
    }

    #[test]
    fn add_domain_takes_optional_notes_and_category() {
        assert_eq!(
            parse(&["add-domain", "c.toml", "shop.example"]).unwrap(),
            Command::AddDomain {
                config_path: "c.toml".to_string(),
                hostname: "shop.example".to_string(),
                notes: String::new(),
                category_id: None,
            }
        );
        assert_eq!(
            parse(&["add-domain", "c.toml", "shop.example", "main store", "42"]).unwrap(),
            Command::AddDomain {
                config_path: "c.toml".to_string(),
                hostname: "shop.example".to_string(),
                notes: "main store".to_string(),
                category_id: Some("42".to_string()),
            }
        );
    }

    #[test]
    fn category_commands_parse() {
        assert_eq!(
            parse(&["list-categories", "c.toml"]).unwrap(),
            Command::ListCategories {
                config_path: "c.toml".to_string()
            }
        );
        assert_eq!(
            parse(&["delete-category", "c.toml", "7"]).unwrap(),
            Command::DeleteCategory {
                config_path: "c.toml".to_string(),
                id: "7".to_string()
            }
        );
        assert_eq!(
            parse(&["update-category", "c.toml", "7", "--color", "#abc", "--name", "Shops"]).unwrap(),
            Command::UpdateCategory {
                config_path: "c.toml".to_string(),
                id: "7".to_string(),
                name: Some("Shops".to_string()),
                color: Some("#abc".to_string()),
            }
        );
    }

    #[test]
    fn update_category_rejects_bad_flags() {
        assert_eq!(parse(&["update-category", "c.toml", "7"]), Err(UsageError::NothingToUpdate));
        assert_eq!(
            parse(&["update-category", "c.toml", "7", "--name"]),
            Err(UsageError::Missing("--name <name>"))
        );
        assert_eq!(
            parse(&["update-category", "c.toml", "7", "--size", "3"]),
            Err(UsageError::UnknownOption("--size".to_string()))
        );
    }

    #[test]
    fn missing_positional_arguments_are_reported() {
        assert_eq!(parse(&["scan"]), Err(UsageError::Missing("<config.toml>")));
        assert_eq!(parse(&["show-domain", "c.toml"]), Err(UsageError::Missing("<hostname>")));
        assert_eq!(parse(&["--verbose"]), Err(UsageError::UnknownOption("--verbose".to_string())));
    }

    #[test]
    fn only_serve_is_the_server() {
        assert!(parse(&[]).unwrap().is_server());
        assert!(!parse(&["scan", "c.toml"]).unwrap().is_server());
        assert_eq!(parse(&["-h"]).unwrap(), Command::Help);
    }
}
