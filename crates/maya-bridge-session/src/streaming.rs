//! Output streaming lifecycle.
//!
//! Enabling installs the console publisher inside Maya, makes sure a live
//! [`OutputListener`] exists, and points the publisher at it. Disabling stops
//! the listener and unregisters the publisher.

use std::net::SocketAddr;

use maya_bridge_command::{
    BuildError, PUBLISHER_SCRIPT, WireCommand, WrapOptions, stream_control_call,
};
use maya_bridge_core::CommandSender;
use maya_bridge_transport::OutputListener;

use crate::{
    context::BridgeContext,
    dispatcher::{CommandDispatcher, FailurePolicy, SendOutcome},
    error::BridgeError,
};

/// Turn console streaming on or off.
///
/// Disabling without a listener does nothing. Enabling while a live
/// listener exists re-sends the control call for the same address instead
/// of starting a second listener; a listener whose thread has exited is
/// replaced.
///
/// The publisher install is best effort. If it was delivered, a failed
/// control call is returned as an error; if it was not, the control call is
/// best effort too.
///
/// Streaming only counts as enabled once a listener is installed.
///
/// # Errors
/// Returns error if settings are unavailable, the listener cannot be
/// started, or a control call fails after a successful install.
pub async fn set_streaming_enabled<C: CommandSender>(
    ctx: &mut BridgeContext,
    dispatcher: &CommandDispatcher<C>,
    enable: bool,
) -> Result<(), BridgeError> {
    if !enable && ctx.listener().is_none() {
        ctx.set_streaming_enabled(false);
        return Ok(());
    }

    let wrap = WrapOptions::from_settings(&ctx.ensure_settings()?);
    let install = WireCommand::control(PUBLISHER_SCRIPT, wrap)?;
    let installed = dispatcher
        .send_command(ctx, &install, FailurePolicy::Suppress)
        .await?
        .is_delivered();
    let policy = if installed {
        FailurePolicy::Propagate
    } else {
        FailurePolicy::Suppress
    };

    if !enable {
        ctx.set_streaming_enabled(false);
        let Some(listener) = ctx.take_listener() else {
            return Ok(());
        };
        listener.shutdown();
        let target = listener.local_addr();
        drop(listener);
        send_stream_control(ctx, dispatcher, false, target, wrap, policy).await?;
        return Ok(());
    }

    let live = ctx
        .listener()
        .filter(|listener| listener.is_alive())
        .map(OutputListener::local_addr);
    let target = match live {
        Some(target) => target,
        None => {
            if let Some(stale) = ctx.take_listener() {
                tracing::debug!(id = %stale.id(), "Replacing stopped output listener");
                stale.shutdown();
            }
            ctx.set_streaming_enabled(false);
            let mut listener = OutputListener::bind(ctx.listener_config())?;
            listener.start(ctx.output_sink())?;
            let target = listener.local_addr();
            ctx.install_listener(listener);
            target
        }
    };
    ctx.set_streaming_enabled(true);

    send_stream_control(ctx, dispatcher, true, target, wrap, policy).await?;
    Ok(())
}

async fn send_stream_control<C: CommandSender>(
    ctx: &mut BridgeContext,
    dispatcher: &CommandDispatcher<C>,
    enable: bool,
    target: SocketAddr,
    wrap: WrapOptions,
    policy: FailurePolicy,
) -> Result<SendOutcome, BridgeError> {
    let code = stream_control_call(enable, target).map_err(BuildError::from)?;
    let command = WireCommand::control(code, wrap)?;
    dispatcher.send_command(ctx, &command, policy).await
}
