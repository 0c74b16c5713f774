use std::time::Duration;

use iced::keyboard::{self, Key};
use iced::widget::{center, container, image, stack, text};
use iced::{event, window, Color, ContentFit, Element, Event, Length, Size, Subscription, Task};

use facemesh_core::shared::constants::QUIT_KEY;

use crate::workers::channel_surface::WorkerMessage;
use crate::workers::display_worker::WorkerLink;

/// How often the window drains frames from the worker.
const FRAME_POLL: Duration = Duration::from_millis(5);

const FPS_COLOR: Color = Color::from_rgb(1.0, 0.0, 1.0);
const FPS_SIZE: f32 = 28.0;

#[derive(Debug, Clone)]
pub enum Message {
    Tick,
    Quit,
    Resized(Size),
}

/// Shows the worker's latest frame with its FPS reading on top.
pub struct App {
    link: WorkerLink,
    frame: Option<image::Handle>,
    fps: f64,
    stopping: bool,
}

impl App {
    pub fn new(link: WorkerLink) -> (Self, Task<Message>) {
        (
            Self {
                link,
                frame: None,
                fps: 0.0,
                stopping: false,
            },
            Task::none(),
        )
    }

    pub fn update(&mut self, message: Message) -> Task<Message> {
        match message {
            Message::Tick => {
                let mut latest = None;
                for msg in self.link.messages.try_iter() {
                    match msg {
                        WorkerMessage::Frame(frame) => latest = Some(frame),
                        WorkerMessage::Stopped(result) => {
                            if let Err(e) = result {
                                log::error!("Display loop stopped: {e}");
                            }
                            self.stopping = true;
                        }
                    }
                }
                if let Some(frame) = latest {
                    self.fps = frame.fps;
                    self.frame = Some(image::Handle::from_rgba(
                        frame.width,
                        frame.height,
                        frame.rgba,
                    ));
                }
                if self.stopping {
                    return iced::exit();
                }
            }
            Message::Quit => {
                log::info!("Quit requested");
                // The worker may already be gone.
                let _ = self.link.quit.send(());
            }
            Message::Resized(size) => {
                self.link
                    .screen
                    .set(size.width.round() as u32, size.height.round() as u32);
            }
        }
        Task::none()
    }

    pub fn view(&self) -> Element<'_, Message> {
        let picture: Element<'_, Message> = match &self.frame {
            Some(handle) => center(image(handle.clone()).content_fit(ContentFit::ScaleDown)).into(),
            None => center(text("Waiting for frames...")).into(),
        };
        let fps = container(
            text(format!("FPS: {}", self.fps as i64))
                .size(FPS_SIZE)
                .color(FPS_COLOR),
        )
        .padding(10);

        container(stack![picture, fps])
            .width(Length::Fill)
            .height(Length::Fill)
            .style(|_| container::background(Color::BLACK))
            .into()
    }

    pub fn subscription(&self) -> Subscription<Message> {
        Subscription::batch([
            iced::time::every(FRAME_POLL).map(|_| Message::Tick),
            event::listen_with(window_event),
        ])
    }
}

fn window_event(event: Event, _status: event::Status, _id: window::Id) -> Option<Message> {
    match event {
        Event::Keyboard(keyboard::Event::KeyPressed {
            key: Key::Character(c),
            ..
        }) if is_quit_key(c.as_str()) => Some(Message::Quit),
        Event::Window(window::Event::Resized(size)) => Some(Message::Resized(size)),
        _ => None,
    }
}

fn is_quit_key(key: &str) -> bool {
    let mut chars = key.chars();
    chars.next() == Some(QUIT_KEY) && chars.next().is_none()
}
