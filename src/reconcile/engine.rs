use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{watch, Mutex};
use tokio::time::{sleep, Instant};
use tracing::{debug, error, info, warn};

use crate::core::{
    ColorLevel, ColorsSet, Error, FirmwareVersion, KettleConfig, LightType, Mode, Result, Status,
    Timing,
};
use crate::network::{KettleConnection, Transport};
use crate::protocol::{variant_for, Capability, DeviceAction, KettleProtocol, ProtocolVariant};
use super::history::SuccessHistory;
use super::target::{self, PendingTarget, TargetState, Transition};
use super::telemetry::Telemetry;

/// Result of one `update()` call
#[derive(Debug)]
pub enum UpdateOutcome {
    Updated,
    /// Gave up after `attempts` tries; `error` is the last failure
    Failed { attempts: u32, error: Error },
    /// The session was disposed before or during the update
    Disposed,
}

impl UpdateOutcome {
    pub fn is_updated(&self) -> bool {
        matches!(self, UpdateOutcome::Updated)
    }
}

/// Options of a single reconciliation
#[derive(Debug, Clone, Default)]
pub struct UpdateRequest {
    /// Refresh telemetry even if the refresh interval has not elapsed
    pub force_stats: bool,
    /// Persist settings after the boil time step
    pub commit: bool,
    /// One-shot call run right after the link is ready; disables retries
    pub action: Option<DeviceAction>,
}

impl UpdateRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn force_stats(mut self) -> Self {
        self.force_stats = true;
        self
    }

    pub fn commit(mut self) -> Self {
        self.commit = true;
        self
    }

    pub fn action(mut self, action: DeviceAction) -> Self {
        self.action = Some(action);
        self
    }
}

/// Everything guarded by the reconciliation lock
struct Session {
    /// Link to the kettle
    connection: KettleConnection,
    /// Command set of the model
    protocol: KettleProtocol,
    /// Retry, TTL and refresh intervals
    timing: Timing,
    /// Keep the link open between updates
    persistent: bool,
    /// Last values read from the device
    cache: Telemetry,
    /// State still to be reached
    target: Option<PendingTarget>,
    /// Boil time still to be written
    boil_time: Option<i8>,
    /// Outcomes of recent updates
    history: SuccessHistory,
    /// When telemetry was last fetched
    last_refresh: Option<Instant>,
}

impl Session {
    fn available(&self) -> bool {
        self.connection.last_connect_ok() && self.connection.last_auth_ok()
    }

    fn target_mode(&self) -> Option<Mode> {
        let pending = self.target.map(|p| p.target);
        target::effective_mode(pending.as_ref(), self.cache.status.as_ref())
    }

    fn snapshot(&self, disposed: bool) -> Telemetry {
        Telemetry {
            target: self.target.map(|p| p.target),
            firmware: self.connection.firmware(),
            available: self.available(),
            connected: self.connection.is_link_alive(),
            auth_ok: self.connection.is_authenticated(),
            success_rate: self.history.success_rate(),
            disposed,
            ..self.cache.clone()
        }
    }

    async fn fetch_status(&mut self) -> Result<Status> {
        let status = self.protocol.get_status(&mut self.connection).await?;
        self.cache.status = Some(status);
        Ok(status)
    }

    async fn settle(&self) {
        sleep(self.timing.settle_delay).await;
    }

    /// Sets the mode and switches the kettle on
    async fn start(&mut self, mode: Mode, temp: u8, boil_time: i8) -> Result<()> {
        let protocol = self.protocol;
        protocol
            .set_main_mode(&mut self.connection, mode, temp, boil_time)
            .await?;
        info!(%mode, temp, "mode set");
        protocol.turn_on(&mut self.connection).await?;
        info!("turned on");
        self.settle().await;
        Ok(())
    }

    async fn stop(&mut self) -> Result<()> {
        self.protocol.turn_off(&mut self.connection).await?;
        info!("turned off");
        self.settle().await;
        Ok(())
    }

    /// Rewrites the current mode with a new boil time; the kettle must be off for that
    async fn write_boil_time(&mut self, status: &Status, boil_time: i8) -> Result<()> {
        if status.is_on {
            self.stop().await?;
        }
        self.protocol
            .set_main_mode(&mut self.connection, status.mode, status.target_temp, boil_time)
            .await
    }

    async fn refresh_telemetry(&mut self) -> Result<()> {
        let protocol = self.protocol;
        let conn = &mut self.connection;
        self.cache.stats = protocol.get_stats(conn).await?;
        self.cache.light_switch_boil = protocol.get_light_switch(conn, LightType::Boil).await?;
        self.cache.light_switch_sync = protocol.get_light_switch(conn, LightType::Sync).await?;
        self.cache.lamp_auto_off_hours = protocol.get_lamp_auto_off_hours(conn).await?;
        self.cache.fresh_water = protocol.get_fresh_water(conn).await?;
        self.cache.colors_boil = protocol.get_colors(conn, LightType::Boil).await?;
        self.cache.colors_lamp = protocol.get_colors(conn, LightType::Lamp).await?;
        Ok(())
    }

    /// One reconciliation attempt
    async fn reconcile(&mut self, request: &UpdateRequest, force_stats: bool) -> Result<()> {
        let protocol = self.protocol;
        self.connection.ensure_ready().await?;

        if let Some(action) = &request.action {
            protocol.apply(&mut self.connection, action).await?;
        }

        let mut status = self.fetch_status().await?;
        let mut boil_time = status.boil_time.unwrap_or(0);

        if let Some(wanted) = self.boil_time.take() {
            if !protocol.variant().supports(Capability::BoilTime) {
                debug!(variant = %protocol.variant(), "boil time is not adjustable");
            } else if status.boil_time != Some(wanted) {
                debug!(from = ?status.boil_time, to = wanted, "updating boil time");
                boil_time = wanted;
                if self.target.is_none() {
                    self.target = Some(PendingTarget::new(TargetState::restore(&status)));
                }
                match self.write_boil_time(&status, wanted).await {
                    Ok(()) => info!(boil_time = wanted, "boil time set"),
                    Err(e) => error!(error = %e, "can't update boil time"),
                }
                status = self.fetch_status().await?;
            }
        }

        if request.commit {
            protocol.commit(&mut self.connection).await?;
        }

        if let Some(pending) = self.target {
            let wanted = pending.target;
            let transition = target::plan(&wanted, &status);
            if transition != Transition::Keep {
                info!(
                    mode = %status.mode,
                    is_on = status.is_on,
                    target_temp = status.target_temp,
                    target = ?wanted,
                    ?transition,
                    "reconciling state"
                );
            }
            match transition {
                Transition::Keep => debug!("no state change needed"),
                Transition::TurnOff => {
                    self.stop().await?;
                    self.fetch_status().await?;
                }
                Transition::TurnOn(mode) => {
                    self.start(mode, wanted.temp, boil_time).await?;
                    self.fetch_status().await?;
                }
                Transition::Restart(mode) => {
                    self.stop().await?;
                    self.start(mode, wanted.temp, boil_time).await?;
                    self.fetch_status().await?;
                }
            }
            self.target = None;
        }

        let refresh_due = self
            .last_refresh
            .map_or(true, |at| at.elapsed() > self.timing.stats_interval);
        if force_stats || refresh_due {
            self.last_refresh = Some(Instant::now());
            self.refresh_telemetry().await?;
        }

        // The interactive light mode expects quick follow-up commands
        if !self.persistent && self.target_mode() != Some(Mode::Game) {
            self.connection.disconnect().await;
        }

        Ok(())
    }
}

/// Session with one kettle.
///
/// All device traffic goes through [`update`](Kettle::update), which is
/// serialized by an internal lock. Setters record what the caller wants and
/// run one update; readers get the last published [`Telemetry`].
pub struct Kettle {
    address: String,
    model: String,
    protocol: KettleProtocol,
    session: Mutex<Session>,
    disposed: Arc<AtomicBool>,
    telemetry: watch::Sender<Telemetry>,
}

impl Kettle {
    /// Creates a session; fails for invalid configs and unknown models
    pub fn new(config: KettleConfig, transport: Arc<dyn Transport>) -> Result<Self> {
        let config = config.normalized()?;
        let variant = variant_for(&config.model)?;
        let protocol = KettleProtocol::new(variant);
        let connection = KettleConnection::new(transport, &config, protocol);
        let disposed = connection.disposed_flag();
        let (telemetry, _) = watch::channel(Telemetry::default());

        info!(address = %config.address, model = %config.model, %variant, "kettle session created");
        Ok(Kettle {
            address: config.address,
            model: config.model,
            protocol,
            session: Mutex::new(Session {
                connection,
                protocol,
                timing: config.timing,
                persistent: config.persistent,
                cache: Telemetry::default(),
                target: None,
                boil_time: None,
                history: SuccessHistory::new(),
                last_refresh: None,
            }),
            disposed,
            telemetry,
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn variant(&self) -> ProtocolVariant {
        self.protocol.variant()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    /// Latest published snapshot
    pub fn telemetry(&self) -> Telemetry {
        self.telemetry.borrow().clone()
    }

    /// Receives a snapshot after every update; drop the receiver to unsubscribe
    pub fn subscribe(&self) -> watch::Receiver<Telemetry> {
        self.telemetry.subscribe()
    }

    /// Whether the last connect and auth attempts succeeded
    pub fn available(&self) -> bool {
        self.telemetry.borrow().available
    }

    pub fn success_rate(&self) -> u8 {
        self.telemetry.borrow().success_rate
    }

    pub fn connected(&self) -> bool {
        self.telemetry.borrow().connected
    }

    pub fn auth_ok(&self) -> bool {
        self.telemetry.borrow().auth_ok
    }

    pub fn firmware_version(&self) -> Option<FirmwareVersion> {
        self.telemetry.borrow().firmware
    }

    pub fn current_temp(&self) -> Option<u8> {
        self.telemetry.borrow().current_temp()
    }

    pub fn current_mode(&self) -> Option<Mode> {
        self.telemetry.borrow().current_mode()
    }

    pub fn target_temp(&self) -> Option<u8> {
        self.telemetry.borrow().target_temp()
    }

    pub fn target_mode(&self) -> Option<Mode> {
        self.telemetry.borrow().target_mode()
    }

    pub fn target_mode_name(&self) -> &'static str {
        self.telemetry.borrow().target_mode_name()
    }

    fn publish(&self, session: &Session) {
        self.telemetry.send_replace(session.snapshot(self.is_disposed()));
    }

    pub async fn update(&self) -> UpdateOutcome {
        self.update_with(UpdateRequest::default()).await
    }

    /// Runs one reconciliation, retrying transient failures.
    ///
    /// The history records a single outcome per call. Auth rejections end the
    /// call at once and are not recorded.
    pub async fn update_with(&self, request: UpdateRequest) -> UpdateOutcome {
        let mut session = self.session.lock().await;
        if self.is_disposed() {
            return UpdateOutcome::Disposed;
        }
        debug!(address = %self.address, "updating");

        let max_tries = match request.action {
            Some(_) => 1,
            None => session.timing.max_tries.max(1),
        };
        let ttl = session.timing.target_ttl;
        let retry_interval = session.timing.retry_interval;

        let mut attempt = 0;
        let outcome = loop {
            attempt += 1;
            // Refresh everything after a period of unavailability
            let force_stats = request.force_stats || !session.available();
            let error = match session.reconcile(&request, force_stats).await {
                Ok(()) => {
                    session.history.record(true);
                    break UpdateOutcome::Updated;
                }
                Err(e) => e,
            };

            session.connection.disconnect().await;
            if session.target.is_some_and(|p| p.expired(ttl)) {
                warn!(
                    address = %self.address,
                    target = ?session.target.map(|p| p.target),
                    ?ttl,
                    "can't reach target state, stop trying"
                );
                session.target = None;
            }

            if self.is_disposed() {
                break UpdateOutcome::Disposed;
            }
            if matches!(error, Error::Auth) {
                break UpdateOutcome::Failed { attempts: attempt, error };
            }
            if error.is_retryable() && attempt < max_tries {
                debug!(address = %self.address, error = %error, attempt, "retrying");
                sleep(retry_interval).await;
                continue;
            }

            warn!(address = %self.address, error = %error, attempts = attempt, "can't update status");
            session.history.record(false);
            break UpdateOutcome::Failed { attempts: attempt, error };
        };

        self.publish(&session);
        outcome
    }

    async fn request_target(&self, choose: impl FnOnce(&Telemetry) -> Option<TargetState>) -> bool {
        {
            let mut session = self.session.lock().await;
            let view = session.snapshot(false);
            let Some(target) = choose(&view) else {
                return true;
            };
            session.target = Some(PendingTarget::new(target));
        }
        self.update().await.is_updated()
    }

    /// Requests a temperature, switching the mode as needed.
    ///
    /// `mode_name` picks the mode when it names one; otherwise the current
    /// target mode is kept.
    pub async fn set_target_temp(&self, temp: u8, mode_name: Option<&str>) -> bool {
        self.request_target(|view| {
            if view.target_temp() == Some(temp) {
                return None;
            }
            let mode = mode_name.and_then(Mode::from_name).or(view.target_mode());
            let wanted = target::for_temperature(temp, mode);
            info!(temp, mode = target::mode_name(wanted.mode), "setting target temperature");
            Some(wanted)
        })
        .await
    }

    /// Requests a mode by name, `"off"` switching the kettle off
    pub async fn set_target_mode(&self, mode_name: &str) -> bool {
        self.request_target(|view| {
            if view.target_mode_name() == mode_name {
                return None;
            }
            let wanted = target::for_mode(Mode::from_name(mode_name), view.target_temp());
            info!(mode = mode_name, temp = wanted.temp, "setting target mode");
            Some(wanted)
        })
        .await
    }

    /// Drops a target that has not been reached yet
    pub async fn cancel_target(&self) {
        let mut session = self.session.lock().await;
        session.target = None;
        self.publish(&session);
    }

    pub async fn set_boil_time(&self, boil_time: i8) -> bool {
        info!(boil_time, "setting boil time");
        self.session.lock().await.boil_time = Some(boil_time);
        self.update_with(UpdateRequest::new().commit()).await.is_updated()
    }

    async fn run(&self, request: UpdateRequest, what: String) -> bool {
        let ok = self.update_with(request).await.is_updated();
        if ok {
            info!(address = %self.address, "{what}");
        } else {
            error!(address = %self.address, "can't {what}");
        }
        ok
    }

    pub async fn impulse_color(&self, r: u8, g: u8, b: u8, brightness: u8) -> bool {
        let action = DeviceAction::ImpulseColor { r, g, b, brightness };
        self.run(UpdateRequest::new().action(action), format!("flash color {r},{g},{b}"))
            .await
    }

    pub async fn set_sound(&self, on: bool) -> bool {
        let request = UpdateRequest::new().commit().action(DeviceAction::SetSound(on));
        self.run(request, format!("set sound to {on}")).await
    }

    pub async fn set_light_switch(&self, light: LightType, on: bool) -> bool {
        let request = UpdateRequest::new()
            .force_stats()
            .commit()
            .action(DeviceAction::SetLightSwitch { light, on });
        self.run(request, format!("set {} light to {on}", light.name())).await
    }

    pub async fn set_fresh_water(&self, on: bool) -> bool {
        let request = UpdateRequest::new()
            .force_stats()
            .action(DeviceAction::SetFreshWater(on));
        self.run(request, format!("set fresh water reminder to {on}")).await
    }

    /// Edits the cached gradient of `light` ahead of the write
    async fn edit_colors(
        &self,
        light: LightType,
        edit: impl FnOnce(ColorsSet) -> ColorsSet,
    ) -> Option<ColorsSet> {
        let mut session = self.session.lock().await;
        let slot = session.cache.colors_mut(light)?;
        let colors = edit((*slot)?);
        *slot = Some(colors);
        // Keep the next refresh from overwriting the pending value
        session.last_refresh = Some(Instant::now());
        self.publish(&session);
        Some(colors)
    }

    async fn write_colors(&self, light: LightType, colors: Option<ColorsSet>, what: String) -> bool {
        match colors {
            Some(colors) => {
                let request = UpdateRequest::new()
                    .commit()
                    .action(DeviceAction::SetColors(colors));
                self.run(request, what).await
            }
            None => {
                debug!(light = light.name(), "colors not known yet");
                false
            }
        }
    }

    pub async fn set_color(&self, light: LightType, level: ColorLevel, rgb: (u8, u8, u8)) -> bool {
        let colors = self.edit_colors(light, |c| c.with_color(level, rgb)).await;
        let what = format!("set {} {level:?} color to {rgb:?}", light.name());
        self.write_colors(light, colors, what).await
    }

    pub async fn set_brightness(&self, light: LightType, brightness: u8) -> bool {
        let colors = self.edit_colors(light, |c| c.with_brightness(brightness)).await;
        let what = format!("set {} brightness to {brightness}", light.name());
        self.write_colors(light, colors, what).await
    }

    pub async fn set_color_temperature(&self, light: LightType, level: ColorLevel, temp: u8) -> bool {
        let colors = self.edit_colors(light, |c| c.with_temperature(level, temp)).await;
        let what = format!("set {} {level:?} temperature to {temp}", light.name());
        self.write_colors(light, colors, what).await
    }

    pub async fn set_lamp_color_interval(&self, secs: u16) -> bool {
        {
            let mut session = self.session.lock().await;
            let cached = u8::try_from(secs).unwrap_or(u8::MAX);
            session.cache.status = session.cache.status.map(|s| s.with_color_interval(cached));
            session.last_refresh = Some(Instant::now());
            self.publish(&session);
        }
        let request = UpdateRequest::new()
            .commit()
            .action(DeviceAction::SetColorInterval(secs));
        self.run(request, format!("set lamp color interval to {secs}")).await
    }

    pub async fn set_lamp_auto_off_hours(&self, hours: u16) -> bool {
        {
            let mut session = self.session.lock().await;
            session.cache.lamp_auto_off_hours = Some(hours);
            session.last_refresh = Some(Instant::now());
            self.publish(&session);
        }
        let request = UpdateRequest::new().action(DeviceAction::SetLampAutoOffHours(hours));
        self.run(request, format!("set lamp auto off hours to {hours}")).await
    }

    /// Disconnects and stops the session; later calls do nothing
    pub async fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        let mut session = self.session.lock().await;
        session.connection.dispose().await;
        self.publish(&session);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::mock::MockKettle;
    use std::time::Duration;

    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_max_level(tracing::Level::DEBUG)
            .try_init();
    }

    fn kettle(mock: &MockKettle, persistent: bool) -> Kettle {
        init_tracing();
        let mut config = KettleConfig::new("C4:12:34:56:78:9A", vec![0x11; 8], "RK-G211S").unwrap();
        config.persistent = persistent;
        Kettle::new(config, Arc::new(mock.clone())).unwrap()
    }

    #[test]
    fn test_address_is_normalized() {
        let mut config = KettleConfig::new("C4:12:34:56:78:9A", vec![1; 8], "RK-G211S").unwrap();
        config.address = "c4-12-34-56-78-9a".to_string();
        let kettle = Kettle::new(config, Arc::new(MockKettle::new())).unwrap();
        assert_eq!(kettle.address(), "C4:12:34:56:78:9A");
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_gets_normalized_address() {
        let mock = MockKettle::new();
        let mut config = KettleConfig::new("C4:12:34:56:78:9A", vec![1; 8], "RK-G211S").unwrap();
        config.address = "c412345678 9a".to_string();
        let kettle = Kettle::new(config, Arc::new(mock.clone())).unwrap();

        assert!(kettle.update().await.is_updated());
        assert_eq!(mock.last_address().as_deref(), Some("C4:12:34:56:78:9A"));
    }

    #[test]
    fn test_unknown_model() {
        let config = KettleConfig::new("C4:12:34:56:78:9A", vec![1; 8], "RK-M170S").unwrap();
        let result = Kettle::new(config, Arc::new(MockKettle::new()));
        assert!(matches!(result, Err(Error::UnknownModel(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_update_fetches_everything() {
        let mock = MockKettle::new();
        let kettle = kettle(&mock, true);

        assert!(kettle.update().await.is_updated());
        assert_eq!(
            mock.log(),
            vec![0xFF, 0x01, 0x6E, 0x06, 0x47, 0x50, 0x35, 0x35, 0x30, 0x52, 0x33, 0x33]
        );

        let telemetry = kettle.telemetry();
        assert!(telemetry.available);
        assert!(telemetry.connected);
        assert_eq!(telemetry.success_rate, 100);
        assert_eq!(telemetry.current_temp(), Some(20));
        assert_eq!(telemetry.lamp_auto_off_hours, Some(24));
        assert!(telemetry.stats.unwrap().unverified);
        assert_eq!(kettle.firmware_version().unwrap().to_string(), "2.7");
        assert_eq!(kettle.target_mode_name(), "off");
    }

    #[tokio::test(start_paused = true)]
    async fn test_heat_from_off() {
        let mock = MockKettle::new();
        let kettle = kettle(&mock, true);

        assert!(kettle.set_target_temp(60, Some("Heat")).await);
        assert_eq!(
            mock.commands_since_sync()[..4],
            [0x06, 0x05, 0x03, 0x06]
        );
        assert!(mock.is_on());

        let telemetry = kettle.telemetry();
        assert_eq!(telemetry.target, None);
        assert_eq!(telemetry.current_mode(), Some(Mode::Heat));
        assert_eq!(telemetry.target_temp(), Some(60));

        // Already there: no traffic
        mock.clear_log();
        assert!(kettle.set_target_temp(60, None).await);
        assert!(mock.log().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_turn_off() {
        let mock = MockKettle::new();
        mock.set_state(Mode::Boil as u8, 0, true);
        let kettle = kettle(&mock, true);
        assert!(kettle.update().await.is_updated());
        assert_eq!(kettle.target_temp(), Some(100));

        mock.clear_log();
        assert!(kettle.set_target_mode("off").await);
        assert_eq!(mock.log(), vec![0x06, 0x04, 0x06]);
        assert!(!mock.is_on());
        assert_eq!(kettle.current_mode(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_on_temperature_change() {
        let mock = MockKettle::new();
        mock.set_state(Mode::Heat as u8, 60, true);
        let kettle = kettle(&mock, true);
        assert!(kettle.update().await.is_updated());

        mock.clear_log();
        assert!(kettle.set_target_temp(70, None).await);
        assert_eq!(mock.log(), vec![0x06, 0x04, 0x05, 0x03, 0x06]);
        assert_eq!(kettle.target_temp(), Some(70));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeouts_record_one_failure() {
        let mock = MockKettle::new();
        mock.set_silent(true);
        let kettle = kettle(&mock, true);

        match kettle.update().await {
            UpdateOutcome::Failed { attempts, error } => {
                assert_eq!(attempts, 3);
                assert!(matches!(error, Error::ReceiveTimeout { command: 0xFF, .. }));
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        assert_eq!(kettle.session.lock().await.history.len(), 1);
        assert_eq!(kettle.success_rate(), 0);
        assert_eq!(mock.connects(), 3);
        assert!(!mock.link_up());
    }

    #[tokio::test(start_paused = true)]
    async fn test_auth_error_is_not_retried() {
        let mock = MockKettle::new();
        mock.reject_auth();
        let kettle = kettle(&mock, true);

        let outcome = kettle.update().await;
        assert!(matches!(outcome, UpdateOutcome::Failed { attempts: 1, error: Error::Auth }));
        assert!(!kettle.available());
        assert!(kettle.session.lock().await.history.is_empty());
        assert_eq!(mock.connects(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_failures_are_retried() {
        let mock = MockKettle::new();
        mock.fail_connects(2);
        let kettle = kettle(&mock, true);

        assert!(kettle.update().await.is_updated());
        assert_eq!(mock.connects(), 3);
        assert_eq!(kettle.session.lock().await.history.len(), 1);
        assert_eq!(kettle.success_rate(), 100);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_refreshes_telemetry() {
        let mock = MockKettle::new();
        let kettle = kettle(&mock, true);
        assert!(kettle.update().await.is_updated());

        mock.clear_log();
        mock.drop_link();
        mock.fail_connects(1);
        assert!(kettle.update().await.is_updated());
        assert_eq!(mock.connects(), 3);
        let log = mock.log();
        assert_eq!(log[..4], [0xFF, 0x01, 0x6E, 0x06]);
        assert!(log.contains(&0x47));
        assert!(log.contains(&0x33));
        assert!(kettle.available());
    }

    #[tokio::test(start_paused = true)]
    async fn test_boil_time_restores_state() {
        let mock = MockKettle::new();
        mock.set_state(Mode::Heat as u8, 60, true);
        let kettle = kettle(&mock, true);
        assert!(kettle.update().await.is_updated());

        mock.clear_log();
        assert!(kettle.set_boil_time(3).await);
        assert_eq!(mock.log(), vec![0x06, 0x04, 0x05, 0x06, 0x36, 0x05, 0x03, 0x06]);

        let telemetry = kettle.telemetry();
        assert_eq!(telemetry.boil_time(), Some(3));
        assert_eq!(telemetry.current_mode(), Some(Mode::Heat));
        assert_eq!(telemetry.target, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_action_is_not_retried() {
        let mock = MockKettle::new();
        let kettle = kettle(&mock, true);
        assert!(kettle.update().await.is_updated());

        mock.set_silent(true);
        mock.clear_log();
        assert!(!kettle.impulse_color(255, 0, 0, 128).await);
        assert_eq!(mock.log(), vec![0x38]);
        assert_eq!(kettle.success_rate(), 50);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_persistent_disconnects() {
        let mock = MockKettle::new();
        let kettle = kettle(&mock, false);

        assert!(kettle.update().await.is_updated());
        assert!(!mock.link_up());
        assert!(!kettle.connected());

        assert!(kettle.update().await.is_updated());
        assert_eq!(mock.connects(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_link_drop_is_published() {
        let mock = MockKettle::new();
        let kettle = kettle(&mock, true);
        assert!(kettle.update().await.is_updated());
        assert!(kettle.connected());

        mock.drop_link();
        kettle.cancel_target().await;
        assert!(!kettle.connected());
    }

    #[tokio::test(start_paused = true)]
    async fn test_game_mode_keeps_link() {
        let mock = MockKettle::new();
        mock.set_state(Mode::Game as u8, 85, true);
        let kettle = kettle(&mock, false);

        assert!(kettle.update().await.is_updated());
        assert!(mock.link_up());
        assert!(kettle.connected());
    }

    #[tokio::test(start_paused = true)]
    async fn test_target_dropped_after_ttl() {
        let mock = MockKettle::new();
        mock.set_silent(true);
        let kettle = kettle(&mock, true);

        assert!(!kettle.set_target_temp(60, None).await);
        assert_eq!(kettle.telemetry().target, Some(TargetState::new(Some(Mode::Heat), 60)));

        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(!kettle.update().await.is_updated());
        assert_eq!(kettle.telemetry().target, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_target() {
        let mock = MockKettle::new();
        mock.set_silent(true);
        let kettle = kettle(&mock, true);

        assert!(!kettle.set_target_mode("Boil").await);
        assert!(kettle.telemetry().target.is_some());
        kettle.cancel_target().await;
        assert!(kettle.telemetry().target.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_color_setters_write_through_cache() {
        let mock = MockKettle::new();
        let kettle = kettle(&mock, true);
        assert!(kettle.update().await.is_updated());

        mock.clear_log();
        assert!(kettle.set_color(LightType::Lamp, ColorLevel::High, (1, 2, 3)).await);
        assert_eq!(mock.log(), vec![0x32, 0x06, 0x36]);
        assert_eq!(kettle.telemetry().color(LightType::Lamp, ColorLevel::High), Some((1, 2, 3)));

        assert!(kettle.set_brightness(LightType::Boil, 200).await);
        let colors = kettle.telemetry().colors_boil.unwrap();
        assert_eq!(colors.brightness, 200);
        assert_eq!(colors.aux, [200, 200]);

        // The sync light has no gradient
        assert!(!kettle.set_color(LightType::Sync, ColorLevel::Low, (1, 1, 1)).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_light_switch_forces_refresh() {
        let mock = MockKettle::new();
        let kettle = kettle(&mock, true);
        assert!(kettle.update().await.is_updated());

        mock.clear_log();
        assert!(kettle.set_light_switch(LightType::Boil, true).await);
        let log = mock.log();
        assert_eq!(log[..3], [0x37, 0x06, 0x36]);
        assert!(log.contains(&0x47));
        assert_eq!(kettle.telemetry().light_switch(LightType::Boil), Some(true));
    }

    #[tokio::test(start_paused = true)]
    async fn test_subscribe_and_dispose() {
        let mock = MockKettle::new();
        let kettle = kettle(&mock, true);
        let mut rx = kettle.subscribe();

        assert!(kettle.update().await.is_updated());
        rx.changed().await.unwrap();
        assert!(rx.borrow().status.is_some());

        kettle.dispose().await;
        kettle.dispose().await;
        rx.changed().await.unwrap();
        assert!(rx.borrow().disposed);
        assert!(!mock.link_up());

        mock.clear_log();
        assert!(matches!(kettle.update().await, UpdateOutcome::Disposed));
        assert!(!kettle.set_sound(true).await);
        assert!(mock.log().is_empty());
        assert!(kettle.is_disposed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_updates_are_serialized() {
        let mock = MockKettle::new();
        let kettle = kettle(&mock, true);

        let (a, b) = tokio::join!(kettle.update(), kettle.update());
        assert!(a.is_updated() && b.is_updated());
        assert_eq!(mock.connects(), 1);
        assert_eq!(kettle.session.lock().await.history.len(), 2);
    }
}
