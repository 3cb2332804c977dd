use std::time::{Duration, Instant};

use anyhow::{Context as _, Result};
use ouroboros::self_referencing;

use winit::application::ApplicationHandler;
use winit::dpi::LogicalSize;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::{Window, WindowId};

use crate::backend::Backend;
use crate::backend::gpu::{GpuInit, WgpuBackend};
use crate::color::Color;
use crate::core::{App, AppControl, Context};
use crate::time::FrameClock;

/// Window and pacing configuration.
#[derive(Debug, Clone)]
pub struct Settings {
    pub title: String,
    pub size: LogicalSize<f64>,
    pub clear_color: Color,
    /// Minimum time between ticks. `Duration::ZERO` ticks as fast as the
    /// present mode allows.
    pub frame_interval: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            title: "division".to_string(),
            size: LogicalSize::new(1280.0, 720.0),
            clear_color: Color::BLACK,
            frame_interval: FrameClock::DEFAULT_INTERVAL,
        }
    }
}

/// Entry point for the runtime.
pub struct Runtime;

impl Runtime {
    /// Opens one window and ticks `app` until it exits or the window closes.
    pub fn run<A>(settings: Settings, gpu_init: GpuInit, app: A) -> Result<()>
    where
        A: for<'w> App<WgpuBackend<'w>> + 'static,
    {
        let event_loop = EventLoop::new().context("failed to create winit EventLoop")?;
        let mut state = AppState {
            settings,
            gpu_init,
            app,
            entry: None,
            failure: None,
        };

        event_loop
            .run_app(&mut state)
            .context("winit event loop terminated with error")?;

        match state.failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[self_referencing]
struct WindowEntry {
    clock: FrameClock,

    window: Window,

    #[borrows(window)]
    #[not_covariant]
    context: Context<WgpuBackend<'this>>,
}

struct AppState<A> {
    settings: Settings,
    gpu_init: GpuInit,
    app: A,

    entry: Option<WindowEntry>,
    failure: Option<anyhow::Error>,
}

impl<A> AppState<A>
where
    A: for<'w> App<WgpuBackend<'w>> + 'static,
{
    fn create_window_entry(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let attrs = Window::default_attributes()
            .with_title(self.settings.title.clone())
            .with_inner_size(self.settings.size);

        let window = event_loop
            .create_window(attrs)
            .context("failed to create window")?;

        let gpu_init = self.gpu_init.clone();
        let clear = self.settings.clear_color;

        let mut entry = WindowEntryTryBuilder {
            clock: FrameClock::with_interval(self.settings.frame_interval),
            window,
            context_builder: |w| {
                pollster::block_on(WgpuBackend::new(w, gpu_init)).map(|backend| {
                    let mut ctx = Context::new(backend);
                    ctx.set_clear_color(clear);
                    ctx
                })
            },
        }
        .try_build()
        .context("GPU initialization failed")?;

        let app = &mut self.app;
        entry
            .with_context_mut(|ctx| {
                log::info!("rendering with the {} backend", ctx.backend().name());
                app.init(ctx)
            })
            .context("application init failed")?;

        entry.with_mut(|fields| fields.clock.reset());
        self.entry = Some(entry);
        Ok(())
    }

    /// Drops the window and its context, then stops the loop.
    fn shutdown(&mut self, event_loop: &ActiveEventLoop) {
        self.entry = None;
        event_loop.exit();
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, err: anyhow::Error) {
        log::error!("{err:#}");
        self.failure.get_or_insert(err);
        self.shutdown(event_loop);
    }

    fn redraw(&mut self, event_loop: &ActiveEventLoop) {
        let (app, entry) = (&mut self.app, &mut self.entry);
        let Some(entry) = entry.as_mut() else {
            return;
        };

        let result = entry.with_mut(|fields| {
            let time = fields.clock.tick();
            fields.context.tick(app, time)
        });

        match result {
            Ok(AppControl::Continue) => {}
            Ok(AppControl::Exit) => self.shutdown(event_loop),
            Err(e) if e.is_fatal() => self.fail(event_loop, e.into()),
            // Already reported through the context.
            Err(_) => {}
        }
    }
}

impl<A> ApplicationHandler for AppState<A>
where
    A: for<'w> App<WgpuBackend<'w>> + 'static,
{
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.entry.is_some() {
            return;
        }

        if let Err(e) = self.create_window_entry(event_loop) {
            self.fail(event_loop, e);
            return;
        }

        if let Some(entry) = &self.entry {
            entry.borrow_window().request_redraw();
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        let Some(entry) = &self.entry else {
            return;
        };

        // Frame pacing gate: redraw only once the minimum interval has elapsed.
        let clock = entry.borrow_clock();
        if clock.is_due(Instant::now()) {
            event_loop.set_control_flow(ControlFlow::Wait);
            entry.borrow_window().request_redraw();
        } else {
            event_loop.set_control_flow(ControlFlow::WaitUntil(clock.next_deadline()));
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _window_id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => self.shutdown(event_loop),

            WindowEvent::Resized(new_size) => {
                if let Some(entry) = self.entry.as_mut() {
                    entry.with_context_mut(|ctx| ctx.backend_mut().resize(new_size));
                    entry.borrow_window().request_redraw();
                }
            }

            WindowEvent::ScaleFactorChanged { .. } => {
                if let Some(entry) = self.entry.as_mut() {
                    let new_size = entry.borrow_window().inner_size();
                    entry.with_context_mut(|ctx| ctx.backend_mut().resize(new_size));
                    entry.borrow_window().request_redraw();
                }
            }

            WindowEvent::RedrawRequested => self.redraw(event_loop),

            _ => {}
        }
    }
}
