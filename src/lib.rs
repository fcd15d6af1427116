use std::{sync::Arc, sync::Mutex};
use winit::{
    application::ApplicationHandler,
    event::*,
    event_loop::{ActiveEventLoop, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::Window,
};
#[cfg(target_arch = "wasm32")]
use winit::event_loop::EventLoopProxy;
use glam::Vec2;

#[cfg(target_arch = "wasm32")]
use wasm_bindgen::prelude::*;
#[cfg(target_arch = "wasm32")]
use once_cell::sync::OnceCell;
#[cfg(target_arch = "wasm32")]
use wasm_bindgen_futures::future_to_promise;
#[cfg(target_arch = "wasm32")]
use js_sys::Promise;

mod app_state;
mod camera;
pub mod circuit;
pub mod color;
pub mod config;
mod models;
mod ui_events;

use app_state::State;
use config::AnimatorConfig;
use ui_events::UserCommand;

#[cfg(target_arch = "wasm32")]
static WASM_API_INSTANCE: OnceCell<WasmApi> = OnceCell::new();

#[cfg(target_arch = "wasm32")]
static WASM_READY_FLUME_CHANNEL: OnceCell<(flume::Sender<()>, flume::Receiver<()>)> = OnceCell::new();


struct App {
    window: Option<Arc<Window>>,
    state: Arc<Mutex<Option<State>>>, // Wrapped in Arc<Mutex> so the wasm init task can fill it in
    animator_config: AnimatorConfig,
    #[cfg(target_arch = "wasm32")]
    proxy: Option<EventLoopProxy<UserCommand>>,
}

impl App {
    fn new(
        animator_config: AnimatorConfig,
        #[cfg(target_arch = "wasm32")] event_loop: &EventLoop<UserCommand>,
    ) -> Self {
        #[cfg(target_arch = "wasm32")]
        let app_proxy = event_loop.create_proxy();

        #[cfg(target_arch = "wasm32")]
        {
            let wasm_api_instance = WasmApi { proxy: app_proxy.clone() };
            if WASM_API_INSTANCE.set(wasm_api_instance).is_err() {
                log::warn!("WASM_API_INSTANCE was already set. This should only happen once.");
            }
        }

        Self {
            window: None,
            state: Arc::new(Mutex::new(None)),
            animator_config,
            #[cfg(target_arch = "wasm32")]
            proxy: Some(app_proxy),
        }
    }

    fn request_redraw(&self) {
        if let Some(w_handle) = self.window.as_ref() {
            w_handle.request_redraw();
        }
    }
}

impl ApplicationHandler<UserCommand> for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        #[allow(unused_mut)]
        let mut window_attributes = Window::default_attributes()
            .with_title("Circuit View");

        #[cfg(target_arch = "wasm32")]
        {
            use wasm_bindgen::JsCast;
            use winit::platform::web::WindowAttributesExtWebSys;

            const CANVAS_ID: &str = "canvas";

            let canvas = wgpu::web_sys::window()
                .and_then(|window| window.document())
                .and_then(|document| document.get_element_by_id(CANVAS_ID));
            let Some(canvas) = canvas else {
                // No drawing surface on the page: stay inert
                log::warn!("No <canvas id=\"{}\"> found; circuit background disabled.", CANVAS_ID);
                return;
            };
            window_attributes = window_attributes.with_canvas(Some(canvas.unchecked_into()));
        }

        let window = match event_loop.create_window(window_attributes) {
            Ok(window) => Arc::new(window),
            Err(e) => {
                log::error!("Failed to create window: {:?}", e);
                event_loop.exit();
                return;
            }
        };
        self.window = Some(window.clone());

        #[cfg(not(target_arch = "wasm32"))]
        {
            match pollster::block_on(State::new(window.clone(), self.animator_config.clone())) {
                Ok(mut state) => {
                    let current_size = window.inner_size();
                    state.resize(current_size.width, current_size.height);
                    if let Ok(mut guard) = self.state.lock() {
                        guard.replace(state);
                    }
                    window.request_redraw();
                }
                Err(e) => log::error!("Failed to create State, circuit background disabled: {:?}", e),
            }
        }

        #[cfg(target_arch = "wasm32")]
        {
            let state_arc_for_spawn = self.state.clone();
            let window_for_state_new = window.clone();
            let animator_config = self.animator_config.clone();
            let Some(proxy_for_init_notification) = self.proxy.clone() else {
                log::error!("App proxy not set.");
                return;
            };

            wasm_bindgen_futures::spawn_local(async move {
                match State::new(window_for_state_new.clone(), animator_config).await {
                    Ok(mut state_instance) => {
                        log::info!("WASM State created in async task.");
                        let initial_size = window_for_state_new.inner_size();
                        state_instance.resize(initial_size.width, initial_size.height);

                        if let Ok(mut app_state_guard) = state_arc_for_spawn.lock() {
                            app_state_guard.replace(state_instance);
                        }
                        log::info!("WASM State assigned to App. Sending initialization notification.");
                        if proxy_for_init_notification.send_event(UserCommand::StateInitialized).is_err() {
                            log::error!("Failed to send StateInitialized event.");
                        }
                    },
                    Err(e) => log::error!("Failed to create State in WASM: {:?}", e),
                }
            });
        }
    }

    fn user_event(&mut self, _event_loop: &ActiveEventLoop, event: UserCommand) {
        match event {
            UserCommand::StateInitialized => {
                log::info!("WASM State initialized and ready.");
                // Signal to the promise resolver
                #[cfg(target_arch = "wasm32")]
                if let Some((sender, _)) = WASM_READY_FLUME_CHANNEL.get() {
                    if let Err(e) = sender.send(()) {
                        log::error!("Failed to send WASM ready signal: {:?}", e);
                    }
                }
                self.request_redraw();
            }
            _ => {
                let restart_loop = match self.state.lock() {
                    Ok(mut guard) => match guard.as_mut() {
                        Some(state) => state.process_command(event),
                        None => {
                            log::warn!("Received a command before state was initialized (via proxy). Ignoring: {:?}", event);
                            false
                        }
                    },
                    Err(_) => false,
                };
                if restart_loop {
                    self.request_redraw();
                }
            }
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: winit::window::WindowId,
        event: WindowEvent,
    ) {
        let Ok(mut guard) = self.state.lock() else {
            return;
        };
        let Some(state) = guard.as_mut() else {
            log::debug!("Window event received before State was initialized, ignoring.");
            if matches!(event, WindowEvent::CloseRequested) {
                event_loop.exit();
            }
            return;
        };

        let Some(window_handle) = self.window.as_ref() else {
            return;
        };

        let mut needs_redraw = false;

        match event {
            WindowEvent::CloseRequested => {
                state.unmount_animator();
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                state.resize(size.width, size.height);
                needs_redraw = true;
            }
            WindowEvent::ScaleFactorChanged { scale_factor, .. } => {
                state.set_scale_factor(scale_factor);
                needs_redraw = true;
            }
            WindowEvent::RedrawRequested => {
                // Keep the frame loop alive only while an animator is mounted
                needs_redraw = state.update();
                match state.render() {
                    Ok(_) => {}
                    Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                        state.reconfigure_surface()
                    }
                    Err(wgpu::SurfaceError::OutOfMemory) => {
                        state.unmount_animator();
                        event_loop.exit();
                    }
                    Err(e) => log::error!("{:?}", e),
                }
            }
            WindowEvent::CursorMoved { position, .. } => {
                state.pointer_moved(Vec2::new(position.x as f32, position.y as f32));
            }
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(code),
                        state: key_state,
                        repeat,
                        ..
                    },
                ..
            } => {
                if key_state.is_pressed() && !repeat {
                    match code {
                        KeyCode::KeyR => state.log_stats(),
                        KeyCode::Space => {
                            needs_redraw = state.process_command(UserCommand::Restart);
                        }
                        _ => {}
                    }
                }
            }
            _ => {}
        }

        if needs_redraw {
            window_handle.request_redraw();
        }
    }
}

cfg_if::cfg_if! {
    if #[cfg(target_arch = "wasm32")] {
        fn init_logging() -> anyhow::Result<()> {
            console_error_panic_hook::set_once();
            console_log::init_with_level(log::Level::Info)?;
            let (sender, receiver) = flume::unbounded();
            if WASM_READY_FLUME_CHANNEL.set((sender, receiver)).is_err() {
                anyhow::bail!("WASM ready channel was already initialized.");
            }
            Ok(())
        }

        // The page pushes its own config through `WasmApi::set_config`
        fn initial_config() -> anyhow::Result<AnimatorConfig> {
            Ok(AnimatorConfig::default())
        }
    } else {
        fn init_logging() -> anyhow::Result<()> {
            env_logger::init();
            Ok(())
        }

        fn initial_config() -> anyhow::Result<AnimatorConfig> {
            Ok(AnimatorConfig::from_env()?)
        }
    }
}

/// Runs the circuit background. Native builds read their config from the
/// file named by `CIRCUITVIEW_CONFIG`, if set.
pub fn run() -> anyhow::Result<()> {
    init_logging()?;
    log::info!("Starting Circuit View.");
    run_with_config(initial_config()?)
}

pub fn run_with_config(animator_config: AnimatorConfig) -> anyhow::Result<()> {
    let event_loop = EventLoop::with_user_event().build()?;
    #[cfg(target_arch = "wasm32")]
    let mut app = App::new(animator_config, &event_loop);
    #[cfg(not(target_arch = "wasm32"))]
    let mut app = App::new(animator_config);
    event_loop.run_app(&mut app)?;

    Ok(())
}

#[cfg(target_arch = "wasm32")]
#[wasm_bindgen(start)]
pub fn run_web() -> Result<(), wasm_bindgen::JsValue> {
    run().map_err(|e| JsValue::from_str(&format!("{e:#}")))
}

#[cfg(target_arch = "wasm32")]
#[wasm_bindgen]
#[derive(Clone, Debug)]
pub struct WasmApi {
    proxy: EventLoopProxy<UserCommand>,
}

#[cfg(target_arch = "wasm32")]
#[wasm_bindgen]
impl WasmApi {
    #[wasm_bindgen(js_name = setConfig)]
    pub fn set_config(&self, config_json: &str) -> Result<(), JsValue> {
        let config = AnimatorConfig::from_json(config_json)
            .map_err(|e| JsValue::from_str(&format!("Config error: {}", e)))?;

        log::info!("Received SetConfig command from JS.");
        self.send(UserCommand::SetConfig(Box::new(config)))
    }

    pub fn restart(&self) -> Result<(), JsValue> {
        self.send(UserCommand::Restart)
    }

    /// Stops the animation for good; call when the page removes the canvas.
    pub fn unmount(&self) -> Result<(), JsValue> {
        self.send(UserCommand::Unmount)
    }

    fn send(&self, command: UserCommand) -> Result<(), JsValue> {
        if self.proxy.send_event(command).is_err() {
            return Err(JsValue::from_str("Failed to send command to event loop."));
        }
        Ok(())
    }
}

#[cfg(target_arch = "wasm32")]
#[wasm_bindgen(js_name = getWasmApi)]
pub fn get_wasm_api() -> Result<WasmApi, JsValue> {
    WASM_API_INSTANCE.get()
        .cloned()
        .ok_or_else(|| JsValue::from_str("WasmApi is not initialized. Call run_web() first."))
}

#[cfg(target_arch = "wasm32")]
#[wasm_bindgen(js_name = getWasmReadyPromise)]
pub fn get_wasm_ready_promise() -> Result<Promise, JsValue> {
    let (_, receiver) = WASM_READY_FLUME_CHANNEL.get()
        .ok_or_else(|| JsValue::from_str("WASM ready channel not initialized. Call run_web() first."))?;
    let receiver = receiver.clone();

    // 将 Rust Future 转换为 JS Promise
    let ready_promise = future_to_promise(async move {
        receiver.recv_async().await
            .map_err(|e| JsValue::from_str(&format!("WASM ready channel closed: {}", e)))?;
        Ok(JsValue::NULL)
    });

    Ok(ready_promise)
}
