//! Functions available inside blueprint templates.
//!
//! | Function | Result |
//! |---|---|
//! | `capture(i=N)` | N'th regex capture group of the current match (0 = whole target) |
//! | `curdir()` | directory of the component declaring the blueprint |
//! | `dir(path=p)` | parent directory of `p` (`.` when it has none) |
//! | `notdir(path=p)` | file name of `p` |
//! | `extension(path=p)` | extension of `p` including the dot, or `""` |
//! | `absolute_dir(path=p)` | absolute parent directory of `p` |
//! | `glob(pattern=p)` | sorted paths matching one pattern or a list of patterns |
//! | `render(template=t)` | `t` rendered with the same context and functions |
//! | `read_file(path=p)` | file contents as a string |
//! | `load_yaml(path=p)` / `load_json(path=p)` | parsed file contents |
//! | `aggregate(pointer=p)` | `p` collected across all components and `data` |

use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tera::Tera;
use tracing::warn;

use super::TemplateRenderer;

type Args = HashMap<String, Value>;

pub(super) fn register(tera: &mut Tera, renderer: &TemplateRenderer) {
    let captures = Arc::clone(&renderer.captures);
    tera.register_function("capture", move |args: &Args| {
        let index = args
            .get("i")
            .and_then(Value::as_u64)
            .ok_or_else(|| tera::Error::msg("capture() requires an integer argument 'i'"))?;
        usize::try_from(index)
            .ok()
            .and_then(|i| captures.get(i))
            .map(|c| Value::String(c.clone()))
            .ok_or_else(|| tera::Error::msg(format!("capture group {index} does not exist")))
    });

    let curdir = renderer.curdir.to_string_lossy().into_owned();
    tera.register_function("curdir", move |_: &Args| Ok(Value::String(curdir.clone())));

    tera.register_function("dir", |args: &Args| {
        let path = path_arg(args, "dir")?;
        let parent = path.parent().map(Path::to_path_buf).unwrap_or_default();
        Ok(path_value(if parent.as_os_str().is_empty() {
            Path::new(".")
        } else {
            &parent
        }))
    });

    tera.register_function("notdir", |args: &Args| {
        let path = path_arg(args, "notdir")?;
        Ok(Value::String(
            path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default(),
        ))
    });

    tera.register_function("extension", |args: &Args| {
        let path = path_arg(args, "extension")?;
        Ok(Value::String(
            path.extension().map(|e| format!(".{}", e.to_string_lossy())).unwrap_or_default(),
        ))
    });

    tera.register_function("absolute_dir", |args: &Args| {
        let path = path_arg(args, "absolute_dir")?;
        let absolute = std::path::absolute(&path)
            .map_err(|e| tera::Error::msg(format!("absolute_dir(): {e}")))?;
        let parent = absolute.parent().map(Path::to_path_buf).unwrap_or(absolute);
        Ok(path_value(&parent))
    });

    tera.register_function("glob", |args: &Args| {
        let patterns = match args.get("pattern").or_else(|| args.get("patterns")) {
            Some(Value::String(p)) => vec![p.clone()],
            Some(Value::Array(items)) => {
                items.iter().filter_map(Value::as_str).map(ToString::to_string).collect()
            }
            _ => return Err(tera::Error::msg("glob() requires a 'pattern' argument")),
        };
        let mut matches = Vec::new();
        for pattern in &patterns {
            let paths = glob::glob(pattern)
                .map_err(|e| tera::Error::msg(format!("invalid glob '{pattern}': {e}")))?;
            for path in paths {
                match path {
                    Ok(path) => matches.push(path.to_string_lossy().into_owned()),
                    Err(e) => warn!("glob '{pattern}': {e}"),
                }
            }
        }
        matches.sort();
        matches.dedup();
        Ok(Value::Array(matches.into_iter().map(Value::String).collect()))
    });

    let nested = renderer.nested();
    tera.register_function("render", move |args: &Args| {
        let template = string_arg(args, "template", "render")?;
        nested
            .render(&template)
            .map(Value::String)
            .map_err(|e| tera::Error::msg(e.to_string()))
    });

    tera.register_function("read_file", |args: &Args| {
        let path = path_arg(args, "read_file")?;
        std::fs::read_to_string(&path)
            .map(Value::String)
            .map_err(|e| tera::Error::msg(format!("read_file({}): {e}", path.display())))
    });

    tera.register_function("load_yaml", |args: &Args| {
        let path = path_arg(args, "load_yaml")?;
        let content = std::fs::read_to_string(&path)
            .map_err(|e| tera::Error::msg(format!("load_yaml({}): {e}", path.display())))?;
        serde_yaml::from_str::<Value>(&content)
            .map_err(|e| tera::Error::msg(format!("load_yaml({}): {e}", path.display())))
    });

    tera.register_function("load_json", |args: &Args| {
        let path = path_arg(args, "load_json")?;
        let content = std::fs::read_to_string(&path)
            .map_err(|e| tera::Error::msg(format!("load_json({}): {e}", path.display())))?;
        serde_json::from_str::<Value>(&content)
            .map_err(|e| tera::Error::msg(format!("load_json({}): {e}", path.display())))
    });

    let data = Arc::clone(&renderer.data);
    tera.register_function("aggregate", move |args: &Args| {
        let pointer = string_arg(args, "pointer", "aggregate")?;
        Ok(aggregate(&data, &pointer))
    });
}

/// Collect the value at `pointer` from every component and from `data`.
///
/// Objects are merged key by key, arrays concatenated and scalars appended.
/// Values whose shape doesn't fit what was collected so far are skipped.
pub fn aggregate(summary: &Value, pointer: &str) -> Value {
    let pointer = if pointer.starts_with('/') {
        pointer.to_string()
    } else {
        format!("/{pointer}")
    };

    let components = summary
        .get("components")
        .and_then(Value::as_object)
        .into_iter()
        .flat_map(|components| components.values());
    let sources = components.chain(summary.get("data"));

    let mut result = Value::Null;
    for value in sources.filter_map(|source| source.pointer(&pointer)) {
        match (&mut result, value) {
            (Value::Null, Value::Object(_) | Value::Array(_)) => result = value.clone(),
            (Value::Null, scalar) => result = Value::Array(vec![scalar.clone()]),
            (Value::Object(collected), Value::Object(incoming)) => {
                for (key, item) in incoming {
                    collected.insert(key.clone(), item.clone());
                }
            }
            (Value::Array(collected), Value::Array(incoming)) => {
                collected.extend(incoming.iter().cloned());
            }
            (Value::Array(collected), scalar) if !scalar.is_object() => {
                collected.push(scalar.clone());
            }
            (_, incoming) => warn!("aggregate({pointer}): skipping incompatible value {incoming}"),
        }
    }
    result
}

fn string_arg(args: &Args, name: &str, function: &str) -> tera::Result<String> {
    match args.get(name) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        Some(Value::Bool(b)) => Ok(b.to_string()),
        _ => Err(tera::Error::msg(format!("{function}() requires a string argument '{name}'"))),
    }
}

fn path_arg(args: &Args, function: &str) -> tera::Result<PathBuf> {
    string_arg(args, "path", function).map(PathBuf::from)
}

fn path_value(path: &Path) -> Value {
    Value::String(path.to_string_lossy().into_owned())
}
