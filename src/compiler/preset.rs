use lazy_static::lazy_static;

/// How a toolchain turns `${source}` into `${executable}`
pub(crate) struct CompilePreset {
  pub(crate) extension: &'static str,
  pub(crate) program: &'static str,
  arguments: Vec<&'static str>,
}

impl CompilePreset {
  fn new(extension: &'static str, program: &'static str, arguments: Vec<&'static str>) -> Self {
    CompilePreset {
      extension,
      program,
      arguments,
    }
  }

  /// Arguments with `${source}` and `${executable}` filled in
  pub(crate) fn arguments(&self, source: &str, executable: &str) -> Vec<String> {
    self
      .arguments
      .iter()
      .map(|arg| {
        arg
          .replace("${source}", source)
          .replace("${executable}", executable)
      })
      .collect()
  }
}

fn gcc_preset(extension: &'static str, program: &'static str, std: &'static str) -> CompilePreset {
  CompilePreset::new(
    extension,
    program,
    vec![
      std,
      "-O2",
      "-static",
      "-DONLINE_JUDGE",
      "-Wall",
      "-Wextra",
      "-Wno-unused-result",
      "${source}",
      "-o",
      "${executable}",
      "-lm",
    ],
  )
}

lazy_static! {
  pub(crate) static ref C11_PRESET: CompilePreset = gcc_preset("c", "gcc", "-std=c11");
  pub(crate) static ref CPP11_PRESET: CompilePreset = gcc_preset("cpp", "g++", "-std=c++11");
  pub(crate) static ref CPP14_PRESET: CompilePreset = gcc_preset("cpp", "g++", "-std=c++14");
  pub(crate) static ref CPP17_PRESET: CompilePreset = gcc_preset("cpp", "g++", "-std=c++17");
  pub(crate) static ref CPP20_PRESET: CompilePreset = gcc_preset("cpp", "g++", "-std=c++20");
  pub(crate) static ref PASCAL_PRESET: CompilePreset = CompilePreset::new(
    "pas",
    "fpc",
    vec!["-O2", "-XS", "-Xt", "-o${executable}", "${source}"]
  );
  pub(crate) static ref RUST_PRESET: CompilePreset = CompilePreset::new(
    "rs",
    "rustc",
    vec![
      "--edition",
      "2021",
      "-O",
      "-C",
      "target-feature=+crt-static",
      "${source}",
      "-o",
      "${executable}"
    ]
  );
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn it_should_fill_arguments() {
    let args = PASCAL_PRESET.arguments("source.pas", "exe");
    assert_eq!(args, vec!["-O2", "-XS", "-Xt", "-oexe", "source.pas"]);

    let args = CPP17_PRESET.arguments("source.cpp", "exe");
    assert_eq!(args[0], "-std=c++17");
    assert!(args.windows(2).any(|w| w[0] == "-o" && w[1] == "exe"));
    assert_eq!(args.last().map(String::as_str), Some("-lm"));
  }
}
