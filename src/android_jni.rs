//! JNI bindings for the Android app.
//!
//! Each public function here corresponds to a `external fun` declaration
//! in SailTrackBridge.kt. The function names follow JNI naming conventions:
//! Java_<package>_<class>_<method> with dots replaced by underscores.
//!
//! Payloads cross the boundary as JSON strings. Failures are raised on the
//! Java side as `IllegalArgumentException` and the call returns null.

use jni::objects::{JClass, JString};
use jni::sys::jstring;
use jni::JNIEnv;

use crate::analysis::{analyze_track_json, interpolate_wind_field_json};

/// Route `log` output to logcat. Safe to call repeatedly.
#[cfg(target_os = "android")]
fn init_logging() {
    use android_logger::Config;
    use log::LevelFilter;

    android_logger::init_once(
        Config::default()
            .with_max_level(LevelFilter::Debug)
            .with_tag("SailTrack"),
    );
}

#[cfg(not(target_os = "android"))]
fn init_logging() {}

/// Convert a Rust string to a Java string, or null if allocation fails.
fn to_jstring(env: &mut JNIEnv, s: &str) -> jstring {
    env.new_string(s)
        .map(|js| js.into_raw())
        .unwrap_or(std::ptr::null_mut())
}

/// Read a JSON argument, run `f` on it and hand back its result.
fn json_call(
    env: &mut JNIEnv,
    input: &JString,
    f: impl FnOnce(&str) -> Result<String, String>,
) -> jstring {
    init_logging();

    let json: String = match env.get_string(input) {
        Ok(s) => s.into(),
        Err(e) => {
            log::warn!("Failed to read JSON argument: {e}");
            return std::ptr::null_mut();
        }
    };

    match f(&json) {
        Ok(out) => to_jstring(env, &out),
        Err(msg) => {
            log::warn!("Request failed: {msg}");
            // A pending exception already describes the failure if this errs
            let _ = env.throw_new("java/lang/IllegalArgumentException", msg);
            std::ptr::null_mut()
        }
    }
}

/// Returns the sailtrack library version.
/// Maps to: SailTrackBridge.version() -> String
#[unsafe(no_mangle)]
pub extern "system" fn Java_com_sailtrack_app_SailTrackBridge_version(
    mut env: JNIEnv,
    _class: JClass,
) -> jstring {
    to_jstring(&mut env, crate::VERSION)
}

/// Analyze a track.
/// Maps to: SailTrackBridge.analyzeTrack(requestJson: String) -> String?
///
/// Request: `{track, config?, boat_type?, polar?, course?}`.
/// Response: serialized `TrackAnalysis`.
#[unsafe(no_mangle)]
pub extern "system" fn Java_com_sailtrack_app_SailTrackBridge_analyzeTrack(
    mut env: JNIEnv,
    _class: JClass,
    request: JString,
) -> jstring {
    json_call(&mut env, &request, analyze_track_json)
}

/// Interpolate a wind field from point estimates.
/// Maps to: SailTrackBridge.interpolateWindField(requestJson: String) -> String?
///
/// Request: `{estimates, bounds, resolution}`.
/// Response: serialized `WindField`, or `null` without estimates.
#[unsafe(no_mangle)]
pub extern "system" fn Java_com_sailtrack_app_SailTrackBridge_interpolateWindField(
    mut env: JNIEnv,
    _class: JClass,
    request: JString,
) -> jstring {
    json_call(&mut env, &request, interpolate_wind_field_json)
}
