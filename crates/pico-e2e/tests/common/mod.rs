//! Shared fixtures: a stand-in generator and a small hydrated page

#![allow(dead_code, unused_macros)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use pico_e2e::HarnessConfig;

/// Write an executable shell script
pub fn write_script(path: &Path, body: &str) -> PathBuf {
    fs::write(path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    fs::set_permissions(path, fs::Permissions::from_mode(0o755)).unwrap();
    path.to_path_buf()
}

/// A generator honouring `render --output <dir> <view> <props>`: it copies
/// the view and appends the props as the root-data script.
pub const RENDER_SCRIPT: &str = r#"
[ "$1" = "render" ] || { echo "unknown command: $1" >&2; exit 64; }
[ "$2" = "--output" ] || { echo "expected --output, got $2" >&2; exit 64; }
out="$3"; view="$4"; props="$5"
mkdir -p "$out"
{
  cat "$view"
  printf '<script id="p-root-data" type="application/json">'
  cat "$props"
  printf '</script>\n</body>\n</html>\n'
} > "$out/index.html"
"#;

pub const HYDRATED_VIEW: &str = r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>Pico</title>
<script>
document.addEventListener('DOMContentLoaded', () => {
  const props = JSON.parse(document.getElementById('p-root-data').textContent);
  let age = props.age;
  const section = document.querySelector('section.age-button');
  const display = section.querySelector('h3');
  const [plus, minus] = section.querySelectorAll('button');
  const render = () => { display.textContent = 'Age: ' + age; };
  plus.addEventListener('click', () => { age += 1; render(); });
  minus.addEventListener('click', () => { age -= 1; render(); });
});
</script>
</head>
<body>
<section class="age-button">
<h3>Age: 2</h3>
<button type="button">+</button>
<button type="button">-</button>
</section>
"#;

/// Same markup, wrong title and no client-side behaviour
pub const STATIC_VIEW: &str = r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"><title>Not Pico</title></head>
<body>
<section class="age-button">
<h3>Age: 2</h3>
<button type="button">+</button>
</section>
<script id="p-root-data" type="application/json">{"age": 2}</script>
"#;

pub const PROPS: &str = r#"{"name": "Pico", "age": 2, "tags": ["static", "reactive"]}"#;

/// Lay out generator, view and props under `dir` and point a config at them
pub fn site_config(dir: &Path, view: &str) -> HarnessConfig {
    let generator = write_script(&dir.join("pico"), RENDER_SCRIPT);
    let views = dir.join("site/views");
    fs::create_dir_all(&views).unwrap();
    fs::write(views.join("home.html"), view).unwrap();
    fs::write(dir.join("site/props.json"), PROPS).unwrap();

    let mut config = HarnessConfig::default();
    config.build.generator_path = generator;
    config.build.view_path = views.join("home.html");
    config.build.props_path = dir.join("site/props.json");
    config.build.output_dir = dir.join("public");
    config.output_dir = dir.join("test-results");
    config.server.port = 0;
    config.timing.hydration_settle_ms = 100;
    config
}

/// Return early from a test when no browser is installed
macro_rules! skip_if_no_chrome {
    () => {
        if !pico_e2e::browser::SessionConfig::default().browser_available() {
            eprintln!("Skipping: no Chrome/Chromium executable detected");
            return;
        }
    };
}
