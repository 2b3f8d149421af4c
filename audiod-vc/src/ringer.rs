//! Ringer and interruption-filter mute computation
//!
//! Pure functions from the current ringer/zen inputs to the set of
//! streams that must be internally muted. The engine diffs the computed
//! set against the current internal mutes and applies the changes.

use audiod_common::config::PlatformConfiguration;
use audiod_common::types::{AudioStream, RingerMode, StreamSet, ZenMode, ZenPolicy};

/// Inputs to the mute computation
#[derive(Debug, Clone, Copy)]
pub struct RingerContext {
    pub ringer_mode: RingerMode,
    pub zen: ZenMode,
    pub zen_policy: ZenPolicy,
    /// Wholesale override of the platform ringer-affected set, installed
    /// by a policy delegate
    pub affected_override: Option<StreamSet>,
    /// Current alias target of the DTMF stream
    pub dtmf_alias: AudioStream,
    /// A call-path voice connection (SCO) is up
    pub call_path_active: bool,
}

/// Streams muted by vibrate/silent ringer modes right now
///
/// Starts from the platform default (or the delegate override), always
/// exempts the enforced-system stream (camera shutter must stay audible),
/// and includes DTMF exactly while it aliases to ring.
pub fn ringer_affected_streams(config: &PlatformConfiguration, ctx: &RingerContext) -> StreamSet {
    let mut set = ctx
        .affected_override
        .unwrap_or_else(|| config.ringer_affected_default());
    set.remove(AudioStream::SystemEnforced);
    if ctx.dtmf_alias == AudioStream::Ring {
        set.insert(AudioStream::Dtmf);
    } else {
        set.remove(AudioStream::Dtmf);
    }
    set
}

/// Whether the interruption filter mutes a stream
///
/// Call-path streams, the enforced-system stream and accessibility
/// prompts are never zen-muted.
pub fn zen_mutes(stream: AudioStream, zen: ZenMode, policy: &ZenPolicy) -> bool {
    if matches!(
        stream,
        AudioStream::VoiceCall
            | AudioStream::BluetoothSco
            | AudioStream::SystemEnforced
            | AudioStream::Accessibility
    ) {
        return false;
    }
    match zen {
        ZenMode::Off => false,
        ZenMode::NoInterruptions => matches!(
            stream,
            AudioStream::Ring
                | AudioStream::Notification
                | AudioStream::System
                | AudioStream::Alarm
                | AudioStream::Music
        ),
        ZenMode::Alarms => matches!(
            stream,
            AudioStream::Ring | AudioStream::Notification | AudioStream::System
        ),
        ZenMode::ImportantInterruptions => match stream {
            AudioStream::Alarm => policy.mute_alarms,
            AudioStream::Music | AudioStream::Tts | AudioStream::Assistant => policy.mute_media,
            AudioStream::System => policy.mute_system,
            AudioStream::Ring | AudioStream::Notification => policy.mute_notification_and_ring,
            _ => false,
        },
    }
}

/// Whether one stream should be internally muted under `ctx`
///
/// Ring-aliased streams stay audible through the call path while a SCO
/// connection is up, so an incoming-call ring is not silently dropped.
pub fn should_mute(stream: AudioStream, config: &PlatformConfiguration, ctx: &RingerContext) -> bool {
    if zen_mutes(stream, ctx.zen, &ctx.zen_policy) {
        return true;
    }
    if !ctx.ringer_mode.mutes_ringer_streams() {
        return false;
    }
    if !ringer_affected_streams(config, ctx).contains(stream) {
        return false;
    }
    let sco_override = ctx.call_path_active && config.alias_of(stream) == AudioStream::Ring;
    !sco_override
}

/// Full internal-mute set for the current inputs
pub fn mute_set(config: &PlatformConfiguration, ctx: &RingerContext) -> StreamSet {
    let mut set = StreamSet::EMPTY;
    for stream in AudioStream::ALL {
        if should_mute(stream, config, ctx) {
            set.insert(stream);
        }
    }
    set
}
