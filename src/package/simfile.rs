use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use crate::package::config::ConfigFile;
use crate::utils::{MemoryLimitType, MIB};
use crate::JudgeError;

/// Test id marking a test that belongs to the initial group whatever its group id is
const OCEN: &str = "ocen";

#[derive(Debug, Clone, PartialEq)]
pub struct Test {
  pub name: String,
  /// Path of the input file inside the package
  pub input: String,
  /// Path of the expected output file, absent for interactive problems
  pub output: Option<String>,
  pub time_limit: Duration,
  pub memory_limit: MemoryLimitType,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Group {
  /// Normalized group id, `"0"` is the initial group
  pub id: String,
  /// Negative score means the group scores in `[score, 0]`
  pub score: i64,
  pub tests: Vec<Test>,
}

/// Package configuration file
///
/// ```text
/// name: Simple Package
/// label: sim
/// interactive: false
/// checker: check/checker.cpp
/// solutions: [prog/sim.cpp, prog/sim1.cpp]
/// memory_limit: 64          # MiB, global
/// limits: [
///   sim0a 1                 # <test> <time limit in seconds> [memory limit in MiB]
///   sim1ocen 2 32
///   sim1a 1.5
/// ]
/// scoring: [
///   0 0                     # <group id> <score>
///   1 100
/// ]
/// tests_files: [
///   sim0a in/sim0a.in out/sim0a.out
///   sim1ocen in/sim1ocen.in out/sim1ocen.out
///   sim1a in/sim1a.in out/sim1a.out
/// ]
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Simfile {
  pub name: Option<String>,
  pub label: Option<String>,
  pub statement: Option<String>,
  pub interactive: bool,
  /// `None` means the default checker
  pub checker: Option<String>,
  /// The first one is the main solution
  pub solutions: Vec<String>,
  pub global_memory_limit: Option<MemoryLimitType>,
  /// Ordered by group id
  pub groups: Vec<Group>,
}

/// Split a test name into (group id, test id), e.g. `test1abc` gives (`1`, `abc`)
pub fn split_test_name(name: &str) -> (&str, &str) {
  let tid_start = name
    .rfind(|c: char| !c.is_ascii_alphabetic())
    .map_or(0, |i| i + 1);
  let (rest, tid) = name.split_at(tid_start);
  let gid_start = rest
    .rfind(|c: char| !c.is_ascii_digit())
    .map_or(0, |i| i + 1);
  (&rest[gid_start..], tid)
}

fn normalize_gid(gid: &str) -> &str {
  let trimmed = gid.trim_start_matches('0');
  if trimmed.is_empty() && !gid.is_empty() {
    "0"
  } else {
    trimmed
  }
}

/// Group the test named `name` belongs to
pub fn group_of(name: &str) -> &str {
  let (gid, tid) = split_test_name(name);
  if tid == OCEN {
    "0"
  } else {
    normalize_gid(gid)
  }
}

/// Numeric order of group ids
pub fn compare_group_ids(a: &str, b: &str) -> Ordering {
  let (a, b) = (normalize_gid(a), normalize_gid(b));
  a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

/// Order of tests: by group, then by test id
pub fn compare_test_names(a: &str, b: &str) -> Ordering {
  let (a_gid, a_tid) = split_test_name(a);
  let (b_gid, b_tid) = split_test_name(b);
  if a_tid == OCEN && b_tid == OCEN {
    return compare_group_ids(a_gid, b_gid);
  }
  compare_group_ids(group_of(a), group_of(b)).then_with(|| a_tid.cmp(b_tid))
}

fn parse_memory_limit(text: &str) -> Option<MemoryLimitType> {
  match text.parse::<u64>() {
    Ok(mib) if mib > 0 => mib.checked_mul(MIB),
    _ => None,
  }
}

fn parse_time_limit(text: &str) -> Option<Duration> {
  match text.parse::<f64>() {
    Ok(seconds) if seconds.is_finite() && seconds > 0.0 => Some(Duration::from_secs_f64(seconds)),
    _ => None,
  }
}

/// Scores used when the package has no `scoring`: the initial group gets nothing
/// and the other groups share 100 points, earlier groups get the remainder
fn default_scores(group_ids: &[&str]) -> Vec<i64> {
  let scored = group_ids.iter().filter(|gid| **gid != "0").count() as i64;
  let mut remainder = if scored > 0 { 100 % scored } else { 0 };
  group_ids
    .iter()
    .map(|gid| {
      if *gid == "0" {
        0
      } else {
        let extra = if remainder > 0 { 1 } else { 0 };
        remainder -= extra;
        100 / scored + extra
      }
    })
    .collect()
}

struct Limits {
  time_limit: Duration,
  memory_limit: MemoryLimitType,
}

impl Simfile {
  /// Parse and validate everything needed for judging
  pub fn parse(contents: &str) -> Result<Simfile, JudgeError> {
    let config = ConfigFile::parse(contents)?;

    let interactive = match config.get_str("interactive") {
      None => false,
      Some(_) => config
        .get_bool("interactive")
        .ok_or_else(|| JudgeError::simfile("interactive: invalid value"))?,
    };

    let checker = config
      .get_str("checker")
      .filter(|checker| !checker.is_empty())
      .map(String::from);
    if interactive && checker.is_none() {
      return Err(JudgeError::simfile(
        "checker: has to be set for an interactive problem",
      ));
    }

    let solutions = match config.get("solutions") {
      None => vec![],
      Some(_) => config
        .get_array("solutions")
        .ok_or_else(|| JudgeError::simfile("solutions: has to be an array"))?
        .to_vec(),
    };

    let global_memory_limit = match config.get_str("memory_limit") {
      None => None,
      Some(text) => Some(
        parse_memory_limit(text).ok_or_else(|| JudgeError::simfile("memory_limit: invalid value"))?,
      ),
    };

    let limits = Simfile::parse_limits(&config, global_memory_limit)?;
    let files = Simfile::parse_tests_files(&config, &limits, interactive)?;

    let mut grouped: BTreeMap<String, Vec<Test>> = BTreeMap::new();
    for (name, limits) in limits {
      let (input, output) = files
        .get(&name)
        .cloned()
        .ok_or_else(|| JudgeError::simfile(format!("tests_files: missing files of test `{}`", name)))?;
      grouped.entry(group_of(&name).to_string()).or_default().push(Test {
        name,
        input,
        output,
        time_limit: limits.time_limit,
        memory_limit: limits.memory_limit,
      });
    }

    let mut group_ids: Vec<&str> = grouped.keys().map(String::as_str).collect();
    group_ids.sort_by(|a, b| compare_group_ids(a, b));
    let scores = Simfile::parse_scoring(&config, &group_ids)?;

    let mut groups = Vec::with_capacity(group_ids.len());
    for (gid, score) in group_ids.iter().zip(scores) {
      let mut tests = grouped.get(*gid).cloned().unwrap_or_default();
      tests.sort_by(|a, b| compare_test_names(&a.name, &b.name));
      groups.push(Group {
        id: gid.to_string(),
        score,
        tests,
      });
    }

    Ok(Simfile {
      name: config.get_str("name").map(String::from),
      label: config.get_str("label").map(String::from),
      statement: config.get_str("statement").map(String::from),
      interactive,
      checker,
      solutions,
      global_memory_limit,
      groups,
    })
  }

  fn parse_limits(
    config: &ConfigFile,
    global_memory_limit: Option<MemoryLimitType>,
  ) -> Result<Vec<(String, Limits)>, JudgeError> {
    let items = config
      .get_array("limits")
      .ok_or_else(|| JudgeError::simfile("limits: has to be set as an array"))?;

    let mut limits: Vec<(String, Limits)> = Vec::with_capacity(items.len());
    for item in items {
      let columns: Vec<&str> = item.split_whitespace().collect();
      let (name, time_limit, memory_limit) = match columns.as_slice() {
        [name, time_limit] => (*name, *time_limit, None),
        [name, time_limit, memory_limit] => (*name, *time_limit, Some(*memory_limit)),
        _ => {
          return Err(JudgeError::simfile(format!(
            "limits: invalid item `{}` - it has to be `<test> <time limit> [memory limit]`",
            item
          )))
        }
      };

      if split_test_name(name).0.is_empty() {
        return Err(JudgeError::simfile(format!(
          "limits: test `{}` has no group id",
          name
        )));
      }
      if limits.iter().any(|(other, _)| other == name) {
        return Err(JudgeError::simfile(format!(
          "limits: test `{}` is defined more than once",
          name
        )));
      }

      let time_limit = parse_time_limit(time_limit).ok_or_else(|| {
        JudgeError::simfile(format!("limits: test `{}` has invalid time limit", name))
      })?;
      let memory_limit = match memory_limit {
        Some(text) => parse_memory_limit(text).ok_or_else(|| {
          JudgeError::simfile(format!("limits: test `{}` has invalid memory limit", name))
        })?,
        None => global_memory_limit.ok_or_else(|| {
          JudgeError::simfile(format!(
            "limits: test `{}` has no memory limit and the global memory limit is not set",
            name
          ))
        })?,
      };

      limits.push((
        name.to_string(),
        Limits {
          time_limit,
          memory_limit,
        },
      ));
    }

    Ok(limits)
  }

  fn parse_scoring(config: &ConfigFile, group_ids: &[&str]) -> Result<Vec<i64>, JudgeError> {
    let items = match config.get("scoring") {
      None => return Ok(default_scores(group_ids)),
      Some(_) => config
        .get_array("scoring")
        .ok_or_else(|| JudgeError::simfile("scoring: has to be an array"))?,
    };

    let mut scores: HashMap<&str, i64> = HashMap::new();
    for item in items {
      let columns: Vec<&str> = item.split_whitespace().collect();
      let (gid, score) = match columns.as_slice() {
        [gid, score] if gid.chars().all(|c| c.is_ascii_digit()) => (normalize_gid(*gid), *score),
        _ => {
          return Err(JudgeError::simfile(format!(
            "scoring: invalid item `{}` - it has to be `<group id> <score>`",
            item
          )))
        }
      };
      let score = score.parse::<i64>().map_err(|_| {
        JudgeError::simfile(format!("scoring: group `{}` has invalid score", gid))
      })?;
      if !group_ids.contains(&gid) {
        return Err(JudgeError::simfile(format!(
          "scoring: group `{}` has no tests",
          gid
        )));
      }
      if scores.insert(gid, score).is_some() {
        return Err(JudgeError::simfile(format!(
          "scoring: group `{}` is scored more than once",
          gid
        )));
      }
    }

    group_ids
      .iter()
      .map(|gid| {
        scores
          .get(gid)
          .copied()
          .ok_or_else(|| JudgeError::simfile(format!("scoring: missing score of group `{}`", gid)))
      })
      .collect()
  }

  fn parse_tests_files(
    config: &ConfigFile,
    limits: &[(String, Limits)],
    interactive: bool,
  ) -> Result<HashMap<String, (String, Option<String>)>, JudgeError> {
    let items = config
      .get_array("tests_files")
      .ok_or_else(|| JudgeError::simfile("tests_files: has to be set as an array"))?;

    let mut files = HashMap::new();
    for item in items {
      let columns: Vec<&str> = item.split_whitespace().collect();
      let (name, input, output) = match columns.as_slice() {
        [name, input] => (*name, *input, None),
        [name, input, output] => (*name, *input, Some(*output)),
        _ => {
          return Err(JudgeError::simfile(format!(
            "tests_files: invalid item `{}` - it has to be `<test> <input> [output]`",
            item
          )))
        }
      };

      if !limits.iter().any(|(test, _)| test == name) {
        return Err(JudgeError::simfile(format!(
          "tests_files: test `{}` is not listed in limits",
          name
        )));
      }
      match (interactive, output) {
        (true, Some(_)) => {
          return Err(JudgeError::simfile(format!(
            "tests_files: test `{}` of an interactive problem cannot have an output file",
            name
          )))
        }
        (false, None) => {
          return Err(JudgeError::simfile(format!(
            "tests_files: test `{}` is missing an output file",
            name
          )))
        }
        _ => {}
      }

      let files_of_test = (input.to_string(), output.map(String::from));
      if files.insert(name.to_string(), files_of_test).is_some() {
        return Err(JudgeError::simfile(format!(
          "tests_files: test `{}` is listed more than once",
          name
        )));
      }
    }

    Ok(files)
  }
}

impl Group {
  pub fn is_initial(&self) -> bool {
    self.id == "0"
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  const SIMFILE: &str = r#"
name: Simple Package
label: sim
checker: check/checker.cpp
solutions: [prog/sim.cpp, prog/sim1.cpp]
memory_limit: 64
limits: [
  sim0b 1.01
  sim0a 1
  sim1ocen 2 32
  sim10a 1
  sim2a 2
  sim1b 1
  sim1a 1
]
scoring: [
  0 0
  1 20
  2 30
  10 -50
]
tests_files: [
  sim0a in/sim0a.in out/sim0a.out
  sim0b in/sim0b.in out/sim0b.out
  sim1ocen in/sim1ocen.in out/sim1ocen.out
  sim1a in/sim1a.in out/sim1a.out
  sim1b in/sim1b.in out/sim1b.out
  sim2a in/sim2a.in out/sim2a.out
  sim10a in/sim10a.in out/sim10a.out
]
"#;

  fn names(group: &Group) -> Vec<&str> {
    group.tests.iter().map(|test| test.name.as_str()).collect()
  }

  #[test]
  fn it_should_split_test_names() {
    assert_eq!(split_test_name("test1abc"), ("1", "abc"));
    assert_eq!(split_test_name("sim4"), ("4", ""));
    assert_eq!(split_test_name("a1b2c"), ("2", "c"));
    assert_eq!(split_test_name("abc"), ("", "abc"));
    assert_eq!(group_of("sim007a"), "7");
    assert_eq!(group_of("sim00a"), "0");
    assert_eq!(group_of("sim3ocen"), "0");
  }

  #[test]
  fn it_should_order_tests() {
    assert_eq!(compare_group_ids("2", "10"), Ordering::Less);
    assert_eq!(compare_group_ids("010", "10"), Ordering::Equal);
    assert_eq!(compare_test_names("sim1a", "sim1b"), Ordering::Less);
    assert_eq!(compare_test_names("sim2a", "sim10a"), Ordering::Less);
    assert_eq!(compare_test_names("sim0b", "sim1ocen"), Ordering::Less);
    assert_eq!(compare_test_names("sim2ocen", "sim1ocen"), Ordering::Greater);
    assert_eq!(compare_test_names("sim5ocen", "sim1a"), Ordering::Less);
  }

  #[test]
  fn it_should_parse_simfile() {
    let simfile = Simfile::parse(SIMFILE).unwrap();
    assert_eq!(simfile.name.as_deref(), Some("Simple Package"));
    assert_eq!(simfile.label.as_deref(), Some("sim"));
    assert_eq!(simfile.checker.as_deref(), Some("check/checker.cpp"));
    assert_eq!(simfile.solutions, vec!["prog/sim.cpp", "prog/sim1.cpp"]);
    assert!(!simfile.interactive);
    assert_eq!(simfile.global_memory_limit, Some(64 * MIB));

    let ids: Vec<&str> = simfile.groups.iter().map(|g| g.id.as_str()).collect();
    assert_eq!(ids, vec!["0", "1", "2", "10"]);
    assert_eq!(names(&simfile.groups[0]), vec!["sim0a", "sim0b", "sim1ocen"]);
    assert_eq!(names(&simfile.groups[1]), vec!["sim1a", "sim1b"]);
    assert!(simfile.groups[0].is_initial());
    assert!(!simfile.groups[1].is_initial());

    let scores: Vec<i64> = simfile.groups.iter().map(|g| g.score).collect();
    assert_eq!(scores, vec![0, 20, 30, -50]);

    let ocen = &simfile.groups[0].tests[2];
    assert_eq!(ocen.time_limit, Duration::from_secs(2));
    assert_eq!(ocen.memory_limit, 32 * MIB);
    assert_eq!(ocen.input, "in/sim1ocen.in");
    assert_eq!(ocen.output.as_deref(), Some("out/sim1ocen.out"));
    assert_eq!(simfile.groups[0].tests[1].time_limit, Duration::from_millis(1010));
  }

  #[test]
  fn it_should_score_by_default() {
    let simfile = Simfile::parse(
      r#"
memory_limit: 16
limits: [a0a 1, a1a 1, a2a 1, a3a 1]
tests_files: [a0a 0.in 0.out, a1a 1.in 1.out, a2a 2.in 2.out, a3a 3.in 3.out]
"#,
    )
    .unwrap();
    let scores: Vec<i64> = simfile.groups.iter().map(|g| g.score).collect();
    assert_eq!(scores, vec![0, 34, 33, 33]);
    assert_eq!(simfile.checker, None);
    assert_eq!(default_scores(&["1", "2", "3", "4", "5", "6", "7"]), vec![15, 15, 14, 14, 14, 14, 14]);
  }

  #[test]
  fn it_should_parse_interactive() {
    let simfile = Simfile::parse(
      r#"
interactive: true
checker: check/interactor.c
memory_limit: 16
limits: [t1a 1]
tests_files: [t1a in/t1a.in]
"#,
    )
    .unwrap();
    assert!(simfile.interactive);
    assert_eq!(simfile.groups[0].tests[0].output, None);
  }

  #[test]
  fn it_should_reject_invalid_simfiles() {
    let cases = [
      // no memory limit
      "limits: [t1a 1]\ntests_files: [t1a a.in a.out]",
      // bad time limit
      "memory_limit: 1\nlimits: [t1a x]\ntests_files: [t1a a.in a.out]",
      "memory_limit: 1\nlimits: [t1a -1]\ntests_files: [t1a a.in a.out]",
      // unknown test in tests_files
      "memory_limit: 1\nlimits: [t1a 1]\ntests_files: [t1a a.in a.out, t1b b.in b.out]",
      // missing output
      "memory_limit: 1\nlimits: [t1a 1]\ntests_files: [t1a a.in]",
      // output of interactive test
      "interactive: true\nchecker: c.c\nmemory_limit: 1\nlimits: [t1a 1]\ntests_files: [t1a a.in a.out]",
      // interactive without checker
      "interactive: true\nmemory_limit: 1\nlimits: [t1a 1]\ntests_files: [t1a a.in]",
      // missing group score
      "memory_limit: 1\nlimits: [t1a 1, t2a 1]\nscoring: [1 10]\ntests_files: [t1a a.in a.out, t2a b.in b.out]",
      // missing files
      "memory_limit: 1\nlimits: [t1a 1, t2a 1]\ntests_files: [t1a a.in a.out]",
      // no group id
      "memory_limit: 1\nlimits: [abc 1]\ntests_files: [abc a.in a.out]",
    ];
    for contents in cases {
      match Simfile::parse(contents) {
        Err(JudgeError::Simfile(_)) => {}
        other => panic!("{:?} for {:?}", other.map(|_| ()), contents),
      }
    }
  }
}
