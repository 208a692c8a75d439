//! Blueprint command pipelines.
//!
//! A blueprint's `process` list is a sequence of single-key maps. The key names
//! either a built-in command or a tool from the summary's `tools` section:
//!
//! ```yaml
//! process:
//!   - execute: "arm-none-eabi-objcopy -O binary {{target}}.elf /dev/stdout"
//!   - pack:
//!       format: "LLx"
//!       data: ["0x{{data.magic}}", "{{data.version}}", "0"]
//!   - save: "{{target}}"
//!   - gcc: "-c {{capture(i=1)}}.c -o {{target}}"
//! ```
//!
//! Every step sees the previous step's output as `captured_output` and
//! produces the output passed to the next one.

use regex::Regex;
use serde_json::Value;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

use crate::blueprint::BlueprintMatch;
use crate::templating::{TemplateError, TemplateRenderer};
use crate::utils::{copy_dir, ensure_dir, find_tool, platform::shell_quote, shell_command};

/// A failed pipeline step.
#[derive(Error, Debug)]
pub enum CommandError {
    #[error("failed to render argument of '{command}': {source}")]
    Render {
        command: String,
        #[source]
        source: TemplateError,
    },

    #[error("'{command}' exited with {}: {stderr}", code.map_or_else(|| "a signal".to_string(), |c| format!("code {c}")))]
    NonZeroExit {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("tool '{name}' is not declared in the summary and was not found on PATH")]
    ToolNotFound {
        name: String,
    },

    #[error("'{path}' does not exist")]
    VerifyFailed {
        path: String,
    },

    #[error("invalid regex '{pattern}': {reason}")]
    InvalidRegex {
        pattern: String,
        reason: String,
    },

    #[error("pack: {reason}")]
    Pack {
        reason: String,
    },

    #[error("'{command}' failed on '{}': {reason}", path.display())]
    Io {
        command: String,
        path: PathBuf,
        reason: String,
    },
}

impl CommandError {
    /// Name of the step that failed.
    pub fn command(&self) -> &str {
        match self {
            Self::Render {
                command,
                ..
            }
            | Self::NonZeroExit {
                command,
                ..
            }
            | Self::Io {
                command,
                ..
            } => command,
            Self::ToolNotFound {
                name,
            } => name,
            Self::VerifyFailed {
                ..
            } => "verify",
            Self::InvalidRegex {
                ..
            } => "regex",
            Self::Pack {
                ..
            } => "pack",
        }
    }
}

/// One step of a blueprint's `process` list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlueprintCommand {
    /// Print the argument, or the captured output when the argument is empty
    Echo(String),
    /// Run a shell command; stdout becomes the captured output
    Execute(String),
    /// Replace matches in the captured output, or keep only the matches
    Regex {
        search: String,
        replace: Option<String>,
    },
    /// Render the argument; `captured_output` is available to the template
    Template(String),
    /// Write the captured output to a file, the target by default
    Save(Option<String>),
    CreateDirectory(String),
    /// Fail unless the path exists
    Verify(String),
    Rm(String),
    /// Pack integers into little-endian binary
    Pack {
        format: String,
        data: Vec<String>,
    },
    Copy {
        source: String,
        destination: String,
    },
    /// Read a file into the captured output
    Cat(String),
    /// Run a tool from the summary's `tools` section or `PATH`
    Tool {
        name: String,
        arguments: String,
    },
}

impl BlueprintCommand {
    /// Parse one `{name: argument}` entry of a `process` list.
    pub fn from_step(step: &Value) -> Result<Self, String> {
        let Some(map) = step.as_object() else {
            return Err(format!("process step must be a single-key map, found {step}"));
        };
        if map.len() != 1 {
            return Err(format!("process step must have exactly one key, found {}", map.len()));
        }
        let Some((name, argument)) = map.iter().next() else {
            return Err("empty process step".to_string());
        };

        let command = match name.as_str() {
            "echo" => Self::Echo(scalar(argument, name)?),
            "execute" => Self::Execute(scalar(argument, name)?),
            "regex" => Self::Regex {
                search: field(argument, "search", name)?,
                replace: optional_field(argument, "replace", name)?,
            },
            "inja" | "template" => Self::Template(scalar(argument, name)?),
            "save" => Self::Save(match argument {
                Value::Null => None,
                other => Some(scalar(other, name)?),
            }),
            "create_directory" => Self::CreateDirectory(scalar(argument, name)?),
            "verify" => Self::Verify(scalar(argument, name)?),
            "rm" => Self::Rm(scalar(argument, name)?),
            "pack" => {
                let data = match argument.get("data") {
                    Some(Value::Array(items)) => {
                        items.iter().map(|item| scalar(item, name)).collect::<Result<_, _>>()?
                    }
                    Some(other) => vec![scalar(other, name)?],
                    None => Vec::new(),
                };
                Self::Pack {
                    format: field(argument, "format", name)?,
                    data,
                }
            }
            "copy" => Self::Copy {
                source: field(argument, "source", name)?,
                destination: field(argument, "destination", name)?,
            },
            "cat" => Self::Cat(scalar(argument, name)?),
            tool => Self::Tool {
                name: tool.to_string(),
                arguments: match argument {
                    Value::Null => String::new(),
                    Value::Array(items) => items
                        .iter()
                        .map(|item| scalar(item, name))
                        .collect::<Result<Vec<_>, _>>()?
                        .join(" "),
                    other => scalar(other, name)?,
                },
            },
        };
        Ok(command)
    }

    /// Name used in logs and errors.
    pub fn name(&self) -> &str {
        match self {
            Self::Echo(_) => "echo",
            Self::Execute(_) => "execute",
            Self::Regex {
                ..
            } => "regex",
            Self::Template(_) => "inja",
            Self::Save(_) => "save",
            Self::CreateDirectory(_) => "create_directory",
            Self::Verify(_) => "verify",
            Self::Rm(_) => "rm",
            Self::Pack {
                ..
            } => "pack",
            Self::Copy {
                ..
            } => "copy",
            Self::Cat(_) => "cat",
            Self::Tool {
                name,
                ..
            } => name,
        }
    }
}

fn scalar(value: &Value, command: &str) -> Result<String, String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Null => Ok(String::new()),
        other => Err(format!("'{command}' expects a string argument, found {other}")),
    }
}

fn field(value: &Value, key: &str, command: &str) -> Result<String, String> {
    optional_field(value, key, command)?.ok_or_else(|| format!("'{command}' requires '{key}'"))
}

fn optional_field(value: &Value, key: &str, command: &str) -> Result<Option<String>, String> {
    match value.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => scalar(v, command).map(Some),
    }
}

/// Run every step of `blueprint_match`'s process list in order.
///
/// `base` renders against the project summary. Returns the output of the
/// last step.
pub fn run_pipeline(
    blueprint_match: &BlueprintMatch,
    base: &TemplateRenderer,
) -> Result<Vec<u8>, CommandError> {
    let summary = base.data();
    let mut renderer = base
        .clone()
        .with_captures(blueprint_match.regex_matches.clone())
        .with_curdir(&blueprint_match.blueprint.parent_path)
        .with_value("target", Value::String(blueprint_match.target.clone()));

    let mut captured = Vec::new();
    for command in &blueprint_match.blueprint.process {
        renderer.set_value(
            "captured_output",
            Value::String(String::from_utf8_lossy(&captured).into_owned()),
        );
        debug!("[{}] {}", blueprint_match.target, command.name());
        captured = run_command(command, &renderer, &blueprint_match.target, summary, captured)?;
    }
    Ok(captured)
}

/// Run a single step, given the previous step's output.
pub fn run_command(
    command: &BlueprintCommand,
    renderer: &TemplateRenderer,
    target: &str,
    summary: &Value,
    captured: Vec<u8>,
) -> Result<Vec<u8>, CommandError> {
    let render = |template: &str| {
        renderer.render(template).map_err(|source| CommandError::Render {
            command: command.name().to_string(),
            source,
        })
    };
    let io_error = |path: &Path, e: &dyn std::fmt::Display| CommandError::Io {
        command: command.name().to_string(),
        path: path.to_path_buf(),
        reason: e.to_string(),
    };

    match command {
        BlueprintCommand::Echo(text) => {
            let text = render(text)?;
            let output = if text.is_empty() {
                captured
            } else {
                text.into_bytes()
            };
            let mut stdout = std::io::stdout().lock();
            stdout
                .write_all(&output)
                .and_then(|()| stdout.write_all(b"\n"))
                .map_err(|e| io_error(Path::new("<stdout>"), &e))?;
            Ok(output)
        }
        BlueprintCommand::Execute(script) => {
            let script = render(script)?;
            run_shell("execute", &script, false)
        }
        BlueprintCommand::Regex {
            search,
            replace,
        } => {
            let pattern = render(search)?;
            let regex = Regex::new(&pattern).map_err(|e| CommandError::InvalidRegex {
                pattern: pattern.clone(),
                reason: e.to_string(),
            })?;
            let input = String::from_utf8_lossy(&captured);
            let output = match replace {
                Some(replacement) => {
                    let replacement = render(replacement)?;
                    regex.replace_all(&input, replacement.as_str()).into_owned()
                }
                None => regex.find_iter(&input).map(|m| m.as_str()).collect::<Vec<_>>().join("\n"),
            };
            Ok(output.into_bytes())
        }
        BlueprintCommand::Template(template) => Ok(render(template)?.into_bytes()),
        BlueprintCommand::Save(path) => {
            let path = match path {
                Some(path) => PathBuf::from(render(path)?),
                None => PathBuf::from(target),
            };
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    ensure_dir(parent).map_err(|e| io_error(parent, &e))?;
                }
            }
            std::fs::write(&path, &captured).map_err(|e| io_error(&path, &e))?;
            Ok(captured)
        }
        BlueprintCommand::CreateDirectory(path) => {
            let path = PathBuf::from(render(path)?);
            ensure_dir(&path).map_err(|e| io_error(&path, &e))?;
            Ok(captured)
        }
        BlueprintCommand::Verify(path) => {
            let path = render(path)?;
            if Path::new(&path).exists() {
                Ok(captured)
            } else {
                Err(CommandError::VerifyFailed {
                    path,
                })
            }
        }
        BlueprintCommand::Rm(path) => {
            let path = PathBuf::from(render(path)?);
            let result = if path.is_dir() {
                std::fs::remove_dir_all(&path)
            } else if path.exists() {
                std::fs::remove_file(&path)
            } else {
                Ok(())
            };
            result.map_err(|e| io_error(&path, &e))?;
            Ok(captured)
        }
        BlueprintCommand::Pack {
            format,
            data,
        } => {
            let values = data.iter().map(|value| render(value)).collect::<Result<Vec<_>, _>>()?;
            pack(&render(format)?, &values)
        }
        BlueprintCommand::Copy {
            source,
            destination,
        } => {
            let source = PathBuf::from(render(source)?);
            let destination = PathBuf::from(render(destination)?);
            if source.is_dir() {
                copy_dir(&source, &destination).map_err(|e| io_error(&source, &e))?;
            } else {
                if let Some(parent) = destination.parent() {
                    if !parent.as_os_str().is_empty() {
                        ensure_dir(parent).map_err(|e| io_error(parent, &e))?;
                    }
                }
                std::fs::copy(&source, &destination).map_err(|e| io_error(&source, &e))?;
            }
            Ok(captured)
        }
        BlueprintCommand::Cat(path) => {
            let path = PathBuf::from(render(path)?);
            std::fs::read(&path).map_err(|e| io_error(&path, &e))
        }
        BlueprintCommand::Tool {
            name,
            arguments,
        } => {
            let program = resolve_tool(name, renderer, summary)?;
            let arguments = render(arguments)?;
            let script = format!("{} {arguments}", shell_quote(&program));
            run_shell(name, script.trim_end(), true)
        }
    }
}

/// Path of a tool: the summary's `tools.<name>` entry when present, else `PATH`.
fn resolve_tool(
    name: &str,
    renderer: &TemplateRenderer,
    summary: &Value,
) -> Result<String, CommandError> {
    if let Some(declared) = summary.get("tools").and_then(|tools| tools.get(name)) {
        if let Some(template) = declared.as_str() {
            return renderer.render(template).map(|path| path.trim().to_string()).map_err(
                |source| CommandError::Render {
                    command: name.to_string(),
                    source,
                },
            );
        }
    }
    find_tool(name).map(|path| path.display().to_string()).ok_or_else(|| {
        CommandError::ToolNotFound {
            name: name.to_string(),
        }
    })
}

fn run_shell(command: &str, script: &str, include_stderr: bool) -> Result<Vec<u8>, CommandError> {
    debug!("Running: {script}");
    let output = shell_command(script).output().map_err(|e| CommandError::Io {
        command: command.to_string(),
        path: PathBuf::from(script),
        reason: e.to_string(),
    })?;

    if !output.status.success() {
        return Err(CommandError::NonZeroExit {
            command: command.to_string(),
            code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    let mut captured = output.stdout;
    if include_stderr {
        captured.extend_from_slice(&output.stderr);
    }
    Ok(captured)
}

/// Pack `values` according to `format`.
///
/// Each format character consumes one value: `L`/`l` write 4 bytes, `S`/`s`
/// 2 bytes, `C`/`c` 1 byte and `x` writes nothing. Values are decimal, or
/// hexadecimal with a `0x` prefix. Output is little-endian; wider values are
/// truncated. Whitespace in the format is ignored.
pub fn pack(format: &str, values: &[String]) -> Result<Vec<u8>, CommandError> {
    let mut output = Vec::new();
    let mut values = values.iter();

    for code in format.chars().filter(|c| !c.is_whitespace()) {
        let width = match code {
            'L' | 'l' => 4,
            'S' | 's' => 2,
            'C' | 'c' => 1,
            'x' => 0,
            other => {
                return Err(CommandError::Pack {
                    reason: format!("unknown format character '{other}'"),
                });
            }
        };
        let Some(value) = values.next() else {
            return Err(CommandError::Pack {
                reason: format!("format '{format}' has more fields than data values"),
            });
        };
        let number = parse_pack_value(value)?;
        output.extend_from_slice(&number.to_le_bytes()[..width]);
    }

    Ok(output)
}

fn parse_pack_value(value: &str) -> Result<u64, CommandError> {
    let value = value.trim();
    let parsed = match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16).ok(),
        None => value.parse::<u64>().ok().or_else(|| value.parse::<i64>().ok().map(|n| n as u64)),
    };
    parsed.ok_or_else(|| CommandError::Pack {
        reason: format!("'{value}' is not an integer"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use crate::blueprint::{Blueprint, BlueprintPattern};
    use serde_json::json;
    use tempfile::TempDir;

    fn pipeline(target: &str, steps: Value, summary: Value) -> Result<Vec<u8>, CommandError> {
        let process = steps
            .as_array()
            .unwrap()
            .iter()
            .map(|step| BlueprintCommand::from_step(step).unwrap())
            .collect();
        let blueprint = Blueprint {
            pattern: BlueprintPattern::Literal(target.to_string()),
            dependencies: Vec::new(),
            process,
            parent_path: PathBuf::from("/ws/components/app"),
            owner: "app".to_string(),
        };
        let blueprint_match = BlueprintMatch {
            blueprint: Arc::new(blueprint),
            target: target.to_string(),
            regex_matches: vec![target.to_string()],
            dependencies: Vec::new(),
        };
        run_pipeline(&blueprint_match, &TemplateRenderer::new(Arc::new(summary)))
    }

    #[test]
    fn test_from_step_parses_builtins_and_tools() {
        assert_eq!(
            BlueprintCommand::from_step(&json!({"echo": "hi"})).unwrap(),
            BlueprintCommand::Echo("hi".to_string())
        );
        assert_eq!(
            BlueprintCommand::from_step(&json!({"save": null})).unwrap(),
            BlueprintCommand::Save(None)
        );
        assert_eq!(
            BlueprintCommand::from_step(&json!({"pack": {"format": "LS", "data": [1, "0x2"]}}))
                .unwrap(),
            BlueprintCommand::Pack {
                format: "LS".to_string(),
                data: vec!["1".to_string(), "0x2".to_string()],
            }
        );
        assert_eq!(
            BlueprintCommand::from_step(&json!({"gcc": ["-c", "a.c"]})).unwrap(),
            BlueprintCommand::Tool {
                name: "gcc".to_string(),
                arguments: "-c a.c".to_string(),
            }
        );
        assert_eq!(BlueprintCommand::from_step(&json!({"inja": "x"})).unwrap().name(), "inja");
    }

    #[test]
    fn test_from_step_rejects_malformed_steps() {
        assert!(BlueprintCommand::from_step(&json!("echo hi")).is_err());
        assert!(BlueprintCommand::from_step(&json!({"echo": "a", "save": "b"})).is_err());
        assert!(BlueprintCommand::from_step(&json!({"regex": {"replace": "x"}})).is_err());
        assert!(BlueprintCommand::from_step(&json!({"copy": {"source": "a"}})).is_err());
        assert!(BlueprintCommand::from_step(&json!({"execute": {"nested": true}})).is_err());
    }

    #[test]
    fn test_pack() {
        let values = |v: &[&str]| v.iter().map(ToString::to_string).collect::<Vec<_>>();
        assert_eq!(
            pack("LSC", &values(&["0x01020304", "513", "255"])).unwrap(),
            vec![0x04, 0x03, 0x02, 0x01, 0x01, 0x02, 0xff]
        );
        assert_eq!(pack("xC", &values(&["99", "7"])).unwrap(), vec![7]);
        assert_eq!(pack("c", &values(&["-1"])).unwrap(), vec![0xff]);
        assert_eq!(pack("l s", &values(&["1", "2"])).unwrap(), vec![1, 0, 0, 0, 2, 0]);
        assert!(pack("Q", &values(&["1"])).is_err());
        assert!(pack("LL", &values(&["1"])).is_err());
        assert!(pack("L", &values(&["nope"])).is_err());
    }

    #[test]
    fn test_pack_renders_values() {
        let output = pipeline(
            "header",
            json!([{"pack": {"format": "SC", "data": ["{{data.version}}", "0x{{data.flag}}"]}}]),
            json!({"data": {"version": 258, "flag": "1f"}}),
        )
        .unwrap();
        assert_eq!(output, vec![0x02, 0x01, 0x1f]);
    }

    #[test]
    fn test_regex_replace_and_extract() {
        let replaced = pipeline(
            "t",
            json!([{"inja": "version=1.2.3"}, {"regex": {"search": "(\\d+)\\.(\\d+)", "replace": "$2.$1"}}]),
            json!({}),
        )
        .unwrap();
        assert_eq!(String::from_utf8(replaced).unwrap(), "version=2.1.3");

        let extracted = pipeline(
            "t",
            json!([{"inja": "a1 b22 c333"}, {"regex": {"search": "\\d+"}}]),
            json!({}),
        )
        .unwrap();
        assert_eq!(String::from_utf8(extracted).unwrap(), "1\n22\n333");
    }

    #[test]
    fn test_template_sees_captured_output() {
        let output = pipeline(
            "t",
            json!([{"inja": "first"}, {"inja": "{{captured_output}}-{{target}}"}]),
            json!({}),
        )
        .unwrap();
        assert_eq!(output, b"first-t");
    }

    #[test]
    fn test_save_cat_copy_rm() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().display().to_string();
        let target = format!("{dir}/out/file.txt");

        pipeline(&target, json!([{"inja": "payload"}, {"save": null}]), json!({})).unwrap();
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "payload");

        let copied = format!("{dir}/copy/file.txt");
        let output = pipeline(
            "t",
            json!([{"copy": {"source": target, "destination": copied}}, {"cat": copied}]),
            json!({}),
        )
        .unwrap();
        assert_eq!(output, b"payload");

        pipeline("t", json!([{"rm": format!("{dir}/copy")}]), json!({})).unwrap();
        assert!(!temp.path().join("copy").exists());
    }

    #[test]
    fn test_create_directory_and_verify() {
        let temp = TempDir::new().unwrap();
        let nested = temp.path().join("a/b/c").display().to_string();

        pipeline("t", json!([{"create_directory": nested}, {"verify": nested}]), json!({}))
            .unwrap();

        let missing = temp.path().join("missing").display().to_string();
        assert!(matches!(
            pipeline("t", json!([{"verify": missing}]), json!({})),
            Err(CommandError::VerifyFailed { .. })
        ));
    }

    #[test]
    fn test_echo_passes_output_along() {
        let output =
            pipeline("t", json!([{"echo": "{{target}}!"}, {"echo": ""}]), json!({})).unwrap();
        assert_eq!(output, b"t!");
    }

    #[test]
    fn test_error_names_the_failing_step() {
        let missing = pipeline("t", json!([{"verify": "/definitely/not/here"}]), json!({}));
        assert_eq!(missing.unwrap_err().command(), "verify");

        let render = pipeline("t", json!([{"inja": "{{ nope }}"}]), json!({}));
        assert_eq!(render.unwrap_err().command(), "inja");
    }

    #[test]
    fn test_render_failure_is_reported() {
        assert!(matches!(
            pipeline("t", json!([{"inja": "{{ nope }}"}]), json!({})),
            Err(CommandError::Render { .. })
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_execute_captures_stdout_and_fails_on_exit_code() {
        let output = pipeline("t", json!([{"execute": "echo {{target}}"}]), json!({})).unwrap();
        assert_eq!(String::from_utf8(output).unwrap().trim(), "t");

        match pipeline("t", json!([{"execute": "echo oops >&2; exit 2"}]), json!({})) {
            Err(CommandError::NonZeroExit {
                code,
                stderr,
                ..
            }) => {
                assert_eq!(code, Some(2));
                assert_eq!(stderr, "oops");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_tool_from_summary_and_path() {
        let output = pipeline(
            "t",
            json!([{"printer": "hello"}]),
            json!({"tools": {"printer": "{{data.echo}}"}, "data": {"echo": "echo"}}),
        )
        .unwrap();
        assert_eq!(String::from_utf8(output).unwrap().trim(), "hello");

        let output = pipeline("t", json!([{"echo_via_path": null}]), json!({}));
        assert!(matches!(output, Err(CommandError::ToolNotFound { .. })));

        let output = pipeline("t", json!([{"printf": "'%s' x"}]), json!({})).unwrap();
        assert_eq!(output, b"x");
    }
}
