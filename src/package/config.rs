use std::collections::HashMap;

use crate::JudgeError;

/// Value of one variable of a config file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigValue {
  Value(String),
  Array(Vec<String>),
}

/// Parsed `name: value` config file.
///
/// ```text
/// # comment
/// name: Simple Package
/// quoted = 'It''s here'        # '' is an escaped apostrophe
/// escaped: "a\tb\n"
/// inline: [a, b, c]
/// multiline: [
///   1a 1       # newlines also separate values
///   1b 1, 1c 2
/// ]
/// ```
#[derive(Debug, Clone, Default)]
pub struct ConfigFile {
  vars: HashMap<String, ConfigValue>,
}

fn parse_error<MS: AsRef<str>>(line: usize, msg: MS) -> JudgeError {
  JudgeError::simfile(format!("line {}: {}", line, msg.as_ref()))
}

fn is_name_char(c: char) -> bool {
  c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.'
}

fn single_quoted(input: &str, line: usize) -> Result<(String, usize), JudgeError> {
  let mut value = String::new();
  let mut chars = input.char_indices().skip(1).peekable();
  while let Some((i, c)) = chars.next() {
    if c == '\'' {
      match chars.peek() {
        Some((_, '\'')) => {
          chars.next();
        }
        _ => return Ok((value, i + 1)),
      }
    }
    value.push(c);
  }
  Err(parse_error(line, "missing terminating ' character"))
}

fn hex_digit(c: Option<char>, line: usize) -> Result<u32, JudgeError> {
  c.and_then(|c| c.to_digit(16))
    .ok_or_else(|| parse_error(line, "incomplete escape sequence \\x"))
}

fn double_quoted(input: &str, line: usize) -> Result<(String, usize), JudgeError> {
  let mut value = String::new();
  let mut chars = input.char_indices().skip(1);
  while let Some((i, c)) = chars.next() {
    match c {
      '"' => return Ok((value, i + 1)),
      '\\' => {
        let escaped = match chars.next() {
          Some((_, escaped)) => escaped,
          None => return Err(parse_error(line, "multi-line strings are not supported")),
        };
        let unescaped = match escaped {
          '\'' | '"' | '?' | '\\' => escaped,
          'a' => '\x07',
          'b' => '\x08',
          'f' => '\x0c',
          'n' => '\n',
          'r' => '\r',
          't' => '\t',
          'v' => '\x0b',
          'x' => {
            let high = hex_digit(chars.next().map(|(_, c)| c), line)?;
            let low = hex_digit(chars.next().map(|(_, c)| c), line)?;
            char::from((high * 16 + low) as u8)
          }
          other => {
            return Err(parse_error(
              line,
              format!("unknown escape sequence \\{}", other),
            ))
          }
        };
        value.push(unescaped);
      }
      _ => value.push(c),
    }
  }
  Err(parse_error(line, "missing terminating \" character"))
}

/// Extract one value from the beginning of `input`, returns the value and the consumed length
fn extract_value(input: &str, line: usize) -> Result<(String, usize), JudgeError> {
  if input.starts_with('\'') {
    return single_quoted(input, line);
  }
  if input.starts_with('"') {
    return double_quoted(input, line);
  }

  let mut end = input.len();
  let mut previous: Option<char> = None;
  for (i, c) in input.char_indices() {
    let comment = c == '#' && previous.map_or(true, |p| p.is_whitespace());
    if c == ']' || c == ',' || comment {
      end = i;
      break;
    }
    previous = Some(c);
  }
  let value = input[..end].trim_end();
  Ok((value.to_string(), value.len()))
}

fn is_blank(rest: &str) -> bool {
  rest.is_empty() || rest.starts_with('#')
}

/// Parse array items following `[`, possibly spanning the next lines
fn parse_array<'a>(
  lines: &[&'a str],
  next_line: &mut usize,
  rest: &'a str,
) -> Result<(Vec<String>, &'a str), JudgeError> {
  let mut items = vec![];
  let mut rest = rest;
  loop {
    rest = rest.trim_start();
    // Many delimiters in a row count as one
    if is_blank(rest) {
      match lines.get(*next_line) {
        Some(line) => {
          rest = *line;
          *next_line += 1;
          continue;
        }
        None => return Err(parse_error(*next_line, "incomplete array")),
      }
    }
    if let Some(after) = rest.strip_prefix(']') {
      return Ok((items, after));
    }
    if let Some(after) = rest.strip_prefix(',') {
      rest = after;
      continue;
    }

    let (value, len) = extract_value(rest, *next_line)?;
    items.push(value);
    rest = &rest[len..];

    let after = rest.trim_start();
    if !(is_blank(after) || after.starts_with(',') || after.starts_with(']')) {
      return Err(parse_error(*next_line, "Expected ',' or ']' after value"));
    }
  }
}

impl ConfigFile {
  pub fn parse(contents: &str) -> Result<ConfigFile, JudgeError> {
    let lines: Vec<&str> = contents.split('\n').collect();
    let mut vars = HashMap::new();
    let mut next_line = 0;

    while next_line < lines.len() {
      let line_number = next_line + 1;
      let line = lines[next_line].trim_start();
      next_line += 1;
      if is_blank(line) {
        continue;
      }

      let name_len = line.find(|c: char| !is_name_char(c)).unwrap_or(line.len());
      if name_len == 0 {
        return Err(parse_error(line_number, "missing variable name"));
      }
      let name = &line[..name_len];
      if vars.contains_key(name) {
        return Err(parse_error(
          line_number,
          format!("variable '{}' defined more than once", name),
        ));
      }

      let rest = line[name_len..].trim_start();
      let rest = match rest.chars().next() {
        Some(':') | Some('=') => rest[1..].trim_start(),
        Some(other) => {
          return Err(parse_error(
            line_number,
            format!("wrong assignment operator '{}'", other),
          ))
        }
        None => return Err(parse_error(line_number, "missing assignment operator")),
      };

      let (value, rest) = if is_blank(rest) {
        (ConfigValue::Value(String::new()), "")
      } else if let Some(array) = rest.strip_prefix('[') {
        let (items, rest) = parse_array(&lines, &mut next_line, array)?;
        (ConfigValue::Array(items), rest)
      } else {
        let (value, len) = extract_value(rest, line_number)?;
        (ConfigValue::Value(value), &rest[len..])
      };

      let rest = rest.trim_start();
      if let Some(c) = rest.chars().next() {
        if c != '#' {
          return Err(parse_error(
            next_line,
            format!("Unknown character at the end of line: {}", c),
          ));
        }
      }

      vars.insert(name.to_string(), value);
    }

    Ok(ConfigFile { vars })
  }

  pub fn is_set(&self, name: &str) -> bool {
    self.vars.contains_key(name)
  }

  pub fn get(&self, name: &str) -> Option<&ConfigValue> {
    self.vars.get(name)
  }

  /// Scalar value, `None` when unset or an array
  pub fn get_str(&self, name: &str) -> Option<&str> {
    match self.vars.get(name) {
      Some(ConfigValue::Value(value)) => Some(value),
      _ => None,
    }
  }

  /// Array value, `None` when unset or a scalar
  pub fn get_array(&self, name: &str) -> Option<&[String]> {
    match self.vars.get(name) {
      Some(ConfigValue::Array(items)) => Some(items),
      _ => None,
    }
  }

  /// `1`, `on` and `true` are true, `0`, `off` and `false` are false
  pub fn get_bool(&self, name: &str) -> Option<bool> {
    match self.get_str(name)?.to_ascii_lowercase().as_str() {
      "1" | "on" | "true" => Some(true),
      "0" | "off" | "false" => Some(false),
      _ => None,
    }
  }
}
