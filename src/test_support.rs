//! Fake ffmpeg executables for tests

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

/// Behaves like the three ffmpeg invocations the server makes
pub const FAKE_FFMPEG: &str = include_str!("../tests/fixtures/fake_ffmpeg.sh");

/// Recorder that never writes its output file
pub const EMPTY_RECORDER: &str = r#"
cat > /dev/null
exit 0
"#;

/// Like the fake ffmpeg, but the recorder for `cam1` never reads stdin
/// and has to be killed
pub const QUIT_IGNORING_RECORDER: &str = r#"
for arg in "$@"; do last="$arg"; done
case " $* " in
  *" -movflags "*)
    while [ $# -gt 0 ]; do
      if [ "$1" = "-i" ]; then input="$2"; fi
      shift
    done
    cp "$input" "$last"
    exit $?
    ;;
esac
printf 'fake transport stream' > "$last"
case " $* " in
  *cam1*) exec sleep 30 ;;
esac
cat > /dev/null
exit 0
"#;

/// Writes an executable `/bin/sh` script
pub fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

pub fn fake_ffmpeg(dir: &Path) -> PathBuf {
    script(dir, "ffmpeg", FAKE_FFMPEG)
}
