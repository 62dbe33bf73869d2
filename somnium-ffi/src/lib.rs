//! C ABI wrapper for the Somnium engine.
//!
//! Exposes the engine facade to host applications: lifecycle, playback,
//! mastering controls, the sleep timer, rendering and the analysis tap.
//!
//! ABI notes
//! - All functions are `extern "C"` and `#[no_mangle]`.
//! - Opaque handle type: `SomniumEngine` (heap-allocated; you own/delete it).
//! - Return codes: `0` success, `-1` null handle or argument, `-2` audio
//!   unavailable.
//! - Rendering produces interleaved stereo; extra channels are silent and mono
//!   receives the average.
//!
//! Threading
//! - `somnium_render_interleaved_f32` may run on the audio thread while every
//!   other function is called from one control thread.
//! - The host calls `somnium_pump` regularly (every 10-50 ms) on the control
//!   thread; timer callbacks fire from inside it.

use std::ffi::{c_char, c_void, CStr};

use log::warn;
use somnium_engine::{Engine, EngineConfig, EngineError, OfflineOutput, SoundKind, SystemClock};

pub const SOMNIUM_OK: i32 = 0;
pub const SOMNIUM_ERR_ARG: i32 = -1;
pub const SOMNIUM_ERR_UNAVAILABLE: i32 = -2;

/// Called with the remaining seconds, or `-1` once no timer is active.
pub type SomniumTimerUpdate = Option<extern "C" fn(user: *mut c_void, remaining: i32)>;
/// Called once when a timer ran out and playback stopped.
pub type SomniumTimerComplete = Option<extern "C" fn(user: *mut c_void)>;

/// Opaque engine wrapper we hand to C.
///
/// The engine and the render side share the renderer through `output`; the
/// render entry point touches only that field.
pub struct SomniumEngine {
    engine: Engine,
    output: OfflineOutput,
}

fn code(r: somnium_engine::Result<()>) -> i32 {
    match r {
        Ok(()) => SOMNIUM_OK,
        Err(EngineError::Unavailable(msg)) => {
            warn!("audio unavailable: {msg}");
            SOMNIUM_ERR_UNAVAILABLE
        }
        Err(e) => {
            warn!("{e}");
            SOMNIUM_ERR_ARG
        }
    }
}

/// Control-side view of a handle.
///
/// # Safety
/// `h` is null or a live handle from `somnium_create`, used from one control thread.
unsafe fn engine<'a>(h: *mut SomniumEngine) -> Option<&'a mut Engine> {
    if h.is_null() {
        None
    } else {
        Some(&mut (*h).engine)
    }
}

/// Render-side view of a handle.
///
/// # Safety
/// `h` is null or a live handle from `somnium_create`.
unsafe fn output<'a>(h: *const SomniumEngine) -> Option<&'a OfflineOutput> {
    if h.is_null() {
        None
    } else {
        Some(&(*h).output)
    }
}

// --- Creation / destruction -------------------------------------------------------

/// Create an idle engine rendering at `sample_rate` Hz. `seed` 0 seeds from the OS.
/// Returns null when the sample rate is unusable.
#[no_mangle]
pub extern "C" fn somnium_create(sample_rate: u32, seed: u64) -> *mut SomniumEngine {
    let config = EngineConfig {
        sample_rate,
        seed: (seed != 0).then_some(seed),
        ..EngineConfig::default()
    };
    let output = OfflineOutput::new();
    match Engine::new(config, Box::new(output.clone()), Box::new(SystemClock::new())) {
        Ok(engine) => Box::into_raw(Box::new(SomniumEngine { engine, output })),
        Err(e) => {
            warn!("somnium_create: {e}");
            std::ptr::null_mut()
        }
    }
}

/// Destroy an engine previously returned by `somnium_create`.
///
/// # Safety
/// `h` must come from `somnium_create` and not be used afterwards. No render
/// call may be in flight.
#[no_mangle]
pub unsafe extern "C" fn somnium_destroy(h: *mut SomniumEngine) {
    if !h.is_null() {
        drop(Box::from_raw(h));
    }
}

/// Build the signal graph. Idempotent.
///
/// # Safety
/// `h` is null or a live handle.
#[no_mangle]
pub unsafe extern "C" fn somnium_init(h: *mut SomniumEngine) -> i32 {
    engine(h).map_or(SOMNIUM_ERR_ARG, |e| code(e.init()))
}

/// Stop playback and release the signal graph.
///
/// # Safety
/// `h` is null or a live handle.
#[no_mangle]
pub unsafe extern "C" fn somnium_teardown(h: *mut SomniumEngine) {
    if let Some(e) = engine(h) {
        e.teardown();
    }
}

// --- Playback --------------------------------------------------------------------

/// Play the sound named by the NUL-terminated `key` (e.g. "deep_somnus").
/// Unknown keys play pink noise.
///
/// # Safety
/// `h` is null or a live handle; `key` is null or a valid C string.
#[no_mangle]
pub unsafe extern "C" fn somnium_play(h: *mut SomniumEngine, key: *const c_char) -> i32 {
    let Some(e) = engine(h) else { return SOMNIUM_ERR_ARG };
    if key.is_null() {
        return SOMNIUM_ERR_ARG;
    }
    let key = CStr::from_ptr(key).to_string_lossy();
    code(e.play_key(&key))
}

/// # Safety
/// `h` is null or a live handle.
#[no_mangle]
pub unsafe extern "C" fn somnium_stop(h: *mut SomniumEngine) {
    if let Some(e) = engine(h) {
        e.stop();
    }
}

/// # Safety
/// `h` is null or a live handle.
#[no_mangle]
pub unsafe extern "C" fn somnium_is_playing(h: *mut SomniumEngine) -> bool {
    engine(h).is_some_and(|e| e.is_playing())
}

/// Number of sound kinds; valid indices for `somnium_kind_key`.
#[no_mangle]
pub extern "C" fn somnium_kind_count() -> u32 {
    SoundKind::ALL.len() as u32
}

/// Static NUL-terminated key of kind `index`, or null past the end.
#[no_mangle]
pub extern "C" fn somnium_kind_key(index: u32) -> *const c_char {
    const KEYS: [&CStr; 31] = [
        c"white", c"pink", c"brown", c"violet", c"drone", c"wind", c"rain", c"storm", c"cosmos",
        c"celestial", c"zen", c"ocean", c"lunar", c"aurora", c"forest", c"quantum", c"elysium",
        c"astral", c"somatic", c"polyrhythm", c"silk", c"alchemist", c"horizon", c"stratus",
        c"stratus_evo", c"status_ii", c"deep_somnus", c"cognitive", c"void", c"ethereal",
        c"biophilic",
    ];
    KEYS.get(index as usize).map_or(std::ptr::null(), |k| k.as_ptr())
}

// --- Mastering -------------------------------------------------------------------

/// Master volume, clamped to [0, 1].
///
/// # Safety
/// `h` is null or a live handle.
#[no_mangle]
pub unsafe extern "C" fn somnium_set_volume(h: *mut SomniumEngine, volume: f32) {
    if let Some(e) = engine(h) {
        e.set_volume(volume);
    }
}

/// Tone, clamped to [0, 100].
///
/// # Safety
/// `h` is null or a live handle.
#[no_mangle]
pub unsafe extern "C" fn somnium_set_tone(h: *mut SomniumEngine, tone: f32) {
    if let Some(e) = engine(h) {
        e.set_tone(tone);
    }
}

/// Manual pan, clamped to [-1, 1]; heard while autopan is off.
///
/// # Safety
/// `h` is null or a live handle.
#[no_mangle]
pub unsafe extern "C" fn somnium_set_pan(h: *mut SomniumEngine, pan: f32) {
    if let Some(e) = engine(h) {
        e.set_pan(pan);
    }
}

/// # Safety
/// `h` is null or a live handle.
#[no_mangle]
pub unsafe extern "C" fn somnium_toggle_autopan(h: *mut SomniumEngine, enabled: bool, speed_hz: f32) {
    if let Some(e) = engine(h) {
        e.toggle_autopan(enabled, speed_hz);
    }
}

/// # Safety
/// `h` is null or a live handle.
#[no_mangle]
pub unsafe extern "C" fn somnium_toggle_safe_mode(h: *mut SomniumEngine, enabled: bool) {
    if let Some(e) = engine(h) {
        e.toggle_safe_mode(enabled);
    }
}

/// # Safety
/// `h` is null or a live handle.
#[no_mangle]
pub unsafe extern "C" fn somnium_fade_in(h: *mut SomniumEngine, secs: f32) {
    if let Some(e) = engine(h) {
        e.fade_in(secs);
    }
}

// --- Timer -----------------------------------------------------------------------

/// Arm a sleep timer of `minutes`. `0` cancels any timer and arms nothing.
/// Returns whether a timer is armed. Callbacks run inside `somnium_pump`.
///
/// # Safety
/// `h` is null or a live handle; `user` must stay valid while the timer lives.
#[no_mangle]
pub unsafe extern "C" fn somnium_start_timer(
    h: *mut SomniumEngine,
    minutes: u32,
    on_update: SomniumTimerUpdate,
    on_complete: SomniumTimerComplete,
    user: *mut c_void,
) -> bool {
    let Some(e) = engine(h) else { return false };
    e.start_timer(
        minutes,
        move |left| {
            if let Some(f) = on_update {
                f(user, left.map_or(-1, |s| s.min(i32::MAX as u32) as i32));
            }
        },
        move || {
            if let Some(f) = on_complete {
                f(user);
            }
        },
    )
}

/// # Safety
/// `h` is null or a live handle.
#[no_mangle]
pub unsafe extern "C" fn somnium_cancel_timer(h: *mut SomniumEngine) {
    if let Some(e) = engine(h) {
        e.cancel_timer();
    }
}

/// Seconds left on the running timer, `-1` without one.
///
/// # Safety
/// `h` is null or a live handle.
#[no_mangle]
pub unsafe extern "C" fn somnium_timer_remaining(h: *mut SomniumEngine) -> i32 {
    engine(h)
        .and_then(|e| e.timer_remaining())
        .map_or(-1, |s| s.min(i32::MAX as u32) as i32)
}

/// Stored timer duration in minutes.
///
/// # Safety
/// `h` is null or a live handle.
#[no_mangle]
pub unsafe extern "C" fn somnium_timer_duration(h: *mut SomniumEngine) -> u32 {
    engine(h).map_or(0, |e| e.timer_duration())
}

/// Set the timer duration (capped at 720); re-arms a running timer.
///
/// # Safety
/// `h` is null or a live handle.
#[no_mangle]
pub unsafe extern "C" fn somnium_set_timer_duration(h: *mut SomniumEngine, minutes: u32) {
    if let Some(e) = engine(h) {
        e.set_timer_duration(minutes);
    }
}

/// # Safety
/// `h` is null or a live handle.
#[no_mangle]
pub unsafe extern "C" fn somnium_quick_add_time(h: *mut SomniumEngine, minutes: u32) {
    if let Some(e) = engine(h) {
        e.quick_add_time(minutes);
    }
}

// --- Orchestration ---------------------------------------------------------------

/// Fire due generator events and timer ticks. Returns how many fired.
///
/// # Safety
/// `h` is null or a live handle.
#[no_mangle]
pub unsafe extern "C" fn somnium_pump(h: *mut SomniumEngine) -> u32 {
    engine(h).map_or(0, |e| e.pump() as u32)
}

/// Milliseconds until the next scheduled event, `-1` when nothing is pending.
///
/// # Safety
/// `h` is null or a live handle.
#[no_mangle]
pub unsafe extern "C" fn somnium_ms_until_next(h: *mut SomniumEngine) -> i64 {
    let Some(e) = engine(h) else { return -1 };
    let now = e.now();
    e.next_deadline()
        .map_or(-1, |d| d.saturating_sub(now).as_millis().min(i64::MAX as u128) as i64)
}

// --- Rendering -------------------------------------------------------------------

/// Render `frames` of audio into an interleaved f32 buffer with `channels`
/// channels. Writes silence before `somnium_init`/`somnium_play`.
///
/// Returns the number of frames rendered (0 on error).
///
/// # Safety
/// `h` is null or a live handle; `out` points to `frames * channels` floats.
#[no_mangle]
pub unsafe extern "C" fn somnium_render_interleaved_f32(
    h: *const SomniumEngine,
    out: *mut f32,
    frames: u32,
    channels: u32,
) -> u32 {
    let Some(o) = output(h) else { return 0 };
    if out.is_null() || frames == 0 || channels == 0 {
        return 0;
    }
    let buf = std::slice::from_raw_parts_mut(out, frames as usize * channels as usize);
    o.render(buf, channels as usize);
    frames
}

// --- Analysis --------------------------------------------------------------------

/// Bins per channel spectrum (half the FFT size).
///
/// # Safety
/// `h` is null or a live handle.
#[no_mangle]
pub unsafe extern "C" fn somnium_frequency_bin_count(h: *mut SomniumEngine) -> u32 {
    engine(h)
        .and_then(|e| e.analysis_tap().ok())
        .map_or(0, |t| t.left.frequency_bin_count() as u32)
}

/// Byte spectrum of `channel` (0 left, 1 right) into `out[..len]`.
/// Returns the number of bins written.
///
/// # Safety
/// `h` is null or a live handle; `out` points to `len` bytes.
#[no_mangle]
pub unsafe extern "C" fn somnium_byte_frequency_data(
    h: *mut SomniumEngine,
    channel: u32,
    out: *mut u8,
    len: u32,
) -> u32 {
    let Some(e) = engine(h) else { return 0 };
    if out.is_null() {
        return 0;
    }
    let Ok(tap) = e.analysis_tap() else { return 0 };
    let analyser = if channel == 0 { &tap.left } else { &tap.right };
    let n = (len as usize).min(analyser.frequency_bin_count());
    let buf = std::slice::from_raw_parts_mut(out, n);
    analyser.byte_frequency_data(buf);
    n as u32
}

/// Spectrum of `channel` in dB into `out[..len]`. Returns the number of bins written.
///
/// # Safety
/// `h` is null or a live handle; `out` points to `len` floats.
#[no_mangle]
pub unsafe extern "C" fn somnium_float_frequency_data(
    h: *mut SomniumEngine,
    channel: u32,
    out: *mut f32,
    len: u32,
) -> u32 {
    let Some(e) = engine(h) else { return 0 };
    if out.is_null() {
        return 0;
    }
    let Ok(tap) = e.analysis_tap() else { return 0 };
    let analyser = if channel == 0 { &tap.left } else { &tap.right };
    let n = (len as usize).min(analyser.frequency_bin_count());
    let buf = std::slice::from_raw_parts_mut(out, n);
    analyser.float_frequency_data(buf);
    n as u32
}

// ------------------------------------ Tests --------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI32, Ordering};

    #[test]
    fn kind_table_matches_the_engine() {
        assert_eq!(somnium_kind_count() as usize, SoundKind::ALL.len());
        for (i, kind) in SoundKind::ALL.iter().enumerate() {
            let key = unsafe { CStr::from_ptr(somnium_kind_key(i as u32)) };
            assert_eq!(key.to_str().unwrap(), kind.key());
        }
        assert!(somnium_kind_key(31).is_null());
    }

    #[test]
    fn null_handles_are_rejected() {
        unsafe {
            assert_eq!(somnium_init(std::ptr::null_mut()), SOMNIUM_ERR_ARG);
            assert_eq!(somnium_play(std::ptr::null_mut(), c"pink".as_ptr()), SOMNIUM_ERR_ARG);
            somnium_stop(std::ptr::null_mut());
            assert_eq!(somnium_timer_remaining(std::ptr::null_mut()), -1);
            assert_eq!(somnium_render_interleaved_f32(std::ptr::null(), std::ptr::null_mut(), 64, 2), 0);
            somnium_destroy(std::ptr::null_mut());
        }
        assert!(somnium_create(12, 0).is_null());
    }

    static LAST: AtomicI32 = AtomicI32::new(0);

    extern "C" fn record(_: *mut c_void, remaining: i32) {
        LAST.store(remaining, Ordering::SeqCst);
    }

    #[test]
    fn play_render_and_timer_round_trip() {
        unsafe {
            let h = somnium_create(48_000, 7);
            assert!(!h.is_null());
            assert_eq!(somnium_play(h, c"ethereal".as_ptr()), SOMNIUM_OK);
            assert!(somnium_is_playing(h));

            let mut buf = vec![0.0f32; 256 * 2];
            assert_eq!(somnium_render_interleaved_f32(h, buf.as_mut_ptr(), 256, 2), 256);

            assert!(somnium_start_timer(h, 2, Some(record), None, std::ptr::null_mut()));
            somnium_pump(h);
            assert_eq!(LAST.load(Ordering::SeqCst), 120);
            somnium_cancel_timer(h);
            assert_eq!(LAST.load(Ordering::SeqCst), -1);

            let bins = somnium_frequency_bin_count(h);
            assert_eq!(bins, 2048);
            let mut spectrum = vec![0u8; bins as usize];
            assert_eq!(somnium_byte_frequency_data(h, 1, spectrum.as_mut_ptr(), bins), bins);

            somnium_stop(h);
            assert!(!somnium_is_playing(h));
            somnium_destroy(h);
        }
    }
}
