//! Canvas demo application
//!
//! Opens a canvas on the selected backend, draws a moving square from a
//! timer, and closes after a fixed number of frames. Without a display the
//! offscreen backend is used and the input is simulated.
//!
//! Usage: `canvas_demo [backend]`, e.g. `canvas_demo headless`.

use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

use log::{info, warn};
use rust_canvas::backend::headless::HeadlessCanvas;
use rust_canvas::foundation::logging;
use rust_canvas::prelude::*;
use thiserror::Error;

const FRAMES: u64 = 60;
const SQUARE: u32 = 32;

#[derive(Error, Debug)]
enum DemoError {
    #[error("canvas error: {0}")]
    Canvas(#[from] AppError),

    #[error("nothing was drawn")]
    NothingDrawn,
}

fn draw_square(canvas: &Canvas, frame: u64) {
    let Some(headless) = canvas.backend_as::<HeadlessCanvas>() else {
        return;
    };
    let (width, height) = canvas.physical_size();
    let span = u64::from(width.saturating_sub(SQUARE).max(1));
    let x = u32::try_from(frame * 4 % span).unwrap_or(0);
    let y = height.saturating_sub(SQUARE) / 2;
    headless.with_framebuffer(|framebuffer| {
        framebuffer.clear([16, 16, 24, 255]);
        framebuffer.fill_rect(x, y, SQUARE, SQUARE, [230, 120, 40, 255]);
    });
}

fn simulate_input(canvas: &Canvas) {
    let Some(headless) = canvas.backend_as::<HeadlessCanvas>() else {
        return;
    };
    let core = headless.core();
    core.mouse_press(MouseButton::Left, headless.mouse_input((10.0, 10.0)));
    core.mouse_move(headless.mouse_input((40.0, 25.0)));
    core.mouse_release(MouseButton::Left, headless.mouse_input((40.0, 25.0)));
}

fn run() -> Result<(), DemoError> {
    let backend = std::env::args().nth(1);
    let runtime = Runtime::new();
    let app = runtime.use_app(backend.as_deref())?;
    info!("{app}");

    let canvas = Canvas::new(&app, CanvasConfig::new("Canvas Demo").with_size(320, 240))?;
    let frames = Rc::new(Cell::new(0_u64));

    let weak = canvas.downgrade();
    let drawn = Rc::clone(&frames);
    canvas.connect(EventType::Draw, move |_| {
        if let Some(canvas) = weak.upgrade() {
            draw_square(&canvas, drawn.get());
            drawn.set(drawn.get() + 1);
        }
    });
    canvas.connect(EventType::MouseRelease, |event| {
        if let Some(mouse) = event.as_mouse() {
            if let Some(trail) = mouse.trail() {
                info!("Dragged through {} points to {:?}", trail.len(), mouse.pos);
            }
        }
    });

    let timer = Timer::new(&app, Duration::from_millis(16))?.with_iterations(Some(FRAMES));
    let weak = canvas.downgrade();
    timer.connect(move |event| match event {
        TimerEvent::Timeout { .. } => {
            if let Some(canvas) = weak.upgrade() {
                canvas.update();
            }
        }
        TimerEvent::Stop => {
            if let Some(canvas) = weak.upgrade() {
                canvas.close();
            }
        }
        TimerEvent::Start => {}
    });

    canvas.show(true);
    simulate_input(&canvas);
    timer.start();
    app.run();

    info!("Drew {} frames", frames.get());
    if frames.get() == 0 {
        return Err(DemoError::NothingDrawn);
    }
    if let Some(frame) = canvas.framebuffer() {
        info!("Last frame {}x{}", frame.width, frame.height);
    }
    Ok(())
}

fn main() {
    logging::init();

    if let Err(err) = run() {
        warn!("Demo failed: {err}");
        std::process::exit(1);
    }
}
