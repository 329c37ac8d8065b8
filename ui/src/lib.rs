//! iced front end for the Instagram image picker.
//!
//! The window owns a [`PickerController`] and runs every [`Step`] it asks
//! for as a `Command`, so network work never blocks the UI thread and all
//! delegate callbacks fire from `update`.

mod image_loader;
mod style;

pub use image_loader::{ImageLoader, ImageLoaderError};

use crate::style::Palette;
use iced::widget::image::Handle;
use iced::widget::{button, column, container, image, row, scrollable, text, Column, Row, Space};
use iced::{
    event, executor, keyboard, subscription, window, Alignment, Application, Command, Element, Event, Length,
    Settings, Size, Subscription, Theme,
};
use picker::{MediaItem, PickerController, PickerState, SessionEvent, Step};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

const COLUMNS: usize = 4;

/// Everything the window needs at startup.
pub struct PickerFlags {
    pub controller: PickerController,
    pub cache_dir: PathBuf,
    /// Parallel thumbnail downloads.
    pub preload: usize,
    /// Lets the host replace the selection while the window is open.
    pub selection_updates: Option<mpsc::UnboundedReceiver<Vec<MediaItem>>>,
}

#[cfg_attr(feature = "trace-spans", tracing::instrument(skip(flags)))]
pub fn run(flags: PickerFlags) -> iced::Result {
    ImagePicker::run(Settings {
        window: window::Settings {
            size: Size::new(720.0, 800.0),
            exit_on_close_request: false,
            ..Default::default()
        },
        ..Settings::with_flags(flags)
    })
}

#[derive(Debug, Clone)]
pub enum Message {
    Session(Option<SessionEvent>),
    ThumbnailLoaded(String, Result<Handle, ImageLoaderError>),
    ToggleItem(String),
    LoadMore,
    Done,
    Cancel,
    CloseRequested,
    SelectionReplaced(Vec<MediaItem>),
}

pub struct ImagePicker {
    controller: PickerController,
    loader: ImageLoader,
    thumbnails: HashMap<String, Handle>,
    requested: HashSet<String>,
    selection_updates: Option<Arc<Mutex<mpsc::UnboundedReceiver<Vec<MediaItem>>>>>,
}

impl ImagePicker {
    pub fn state(&self) -> &PickerState {
        self.controller.state()
    }

    pub fn media_count(&self) -> usize {
        self.controller.media().len()
    }

    pub fn selected_ids(&self) -> Vec<String> {
        self.controller.selected().iter().map(|m| m.id.clone()).collect()
    }

    pub fn thumbnail_count(&self) -> usize {
        self.thumbnails.len()
    }

    pub fn error_message(&self) -> Option<String> {
        match self.controller.state() {
            PickerState::Failed(e) => Some(e.to_string()),
            _ => None,
        }
    }

    fn run_step(&self, step: Step) -> Command<Message> {
        if step == Step::Idle {
            return Command::none();
        }
        let session = self.controller.session().clone();
        Command::perform(async move { session.execute(step).await }, Message::Session)
    }

    /// Thumbnail requests for displayed media not yet fetched or in flight.
    fn request_thumbnails(&mut self) -> Command<Message> {
        let mut commands = Vec::new();
        for item in self.controller.media() {
            if self.thumbnails.contains_key(&item.id) || self.requested.contains(&item.id) {
                continue;
            }
            self.requested.insert(item.id.clone());
            let loader = self.loader.clone();
            let item = item.clone();
            let id = item.id.clone();
            commands.push(Command::perform(
                async move { loader.load_thumbnail(&item).await },
                move |result| Message::ThumbnailLoaded(id, result),
            ));
        }
        Command::batch(commands)
    }

    fn close() -> Command<Message> {
        window::close(window::Id::MAIN)
    }

    fn header(&self) -> Element<'_, Message> {
        let open = !self.controller.state().is_terminal();
        let count = self.controller.selected().len();

        let cancel = button(text("Cancel"))
            .style(style::button_primary())
            .on_press(Message::Cancel);
        // Disabled once the session is over.
        let mut done = button(text("Done")).style(style::button_primary());
        if open {
            done = done.on_press(Message::Done);
        }

        row![
            text("Instagram").size(24),
            text(format!("{} selected", count)).size(16),
            Space::with_width(Length::Fill),
            cancel,
            done,
        ]
        .spacing(Palette::SPACING)
        .align_items(Alignment::Center)
        .into()
    }

    fn tile(&self, item: &MediaItem) -> Element<'_, Message> {
        let content: Element<Message> = match self.thumbnails.get(&item.id) {
            Some(handle) => image(handle.clone())
                .width(Length::Fixed(Palette::TILE_SIZE))
                .height(Length::Fixed(Palette::TILE_SIZE))
                .into(),
            None => container(text("…"))
                .width(Length::Fixed(Palette::TILE_SIZE))
                .height(Length::Fixed(Palette::TILE_SIZE))
                .center_x()
                .center_y()
                .into(),
        };
        button(content)
            .padding(4)
            .style(style::tile(self.controller.is_selected(&item.id)))
            .on_press(Message::ToggleItem(item.id.clone()))
            .into()
    }

    fn grid(&self) -> Element<'_, Message> {
        let mut rows = Column::new().spacing(Palette::TILE_GAP);
        for chunk in self.controller.media().chunks(COLUMNS) {
            let mut current = Row::new().spacing(Palette::TILE_GAP);
            for item in chunk {
                current = current.push(self.tile(item));
            }
            rows = rows.push(current);
        }

        match self.controller.state() {
            PickerState::Loading => rows = rows.push(text("Loading…").size(16)),
            PickerState::Ready if self.controller.has_more() => {
                rows = rows.push(button(text("Load more")).style(style::button_primary()).on_press(Message::LoadMore))
            }
            _ => {}
        }

        scrollable(rows).height(Length::Fill).into()
    }
}

impl Application for ImagePicker {
    type Executor = executor::Default;
    type Message = Message;
    type Theme = Theme;
    type Flags = PickerFlags;

    #[cfg_attr(feature = "trace-spans", tracing::instrument(skip(flags)))]
    fn new(flags: PickerFlags) -> (Self, Command<Message>) {
        let PickerFlags {
            mut controller,
            cache_dir,
            preload,
            selection_updates,
        } = flags;

        let step = controller.start();
        let picker = Self {
            controller,
            loader: ImageLoader::new(cache_dir, preload),
            thumbnails: HashMap::new(),
            requested: HashSet::new(),
            selection_updates: selection_updates.map(|rx| Arc::new(Mutex::new(rx))),
        };
        let command = picker.run_step(step);
        (picker, command)
    }

    fn title(&self) -> String {
        String::from("Select from Instagram")
    }

    #[cfg_attr(feature = "trace-spans", tracing::instrument(skip(self, message)))]
    fn update(&mut self, message: Message) -> Command<Message> {
        match message {
            Message::Session(Some(event)) => {
                let step = self.controller.handle(event);
                let next = self.run_step(step);
                let thumbs = self.request_thumbnails();
                return Command::batch(vec![next, thumbs]);
            }
            Message::Session(None) => {}
            Message::ThumbnailLoaded(id, result) => {
                self.requested.remove(&id);
                match result {
                    Ok(handle) => {
                        self.thumbnails.insert(id, handle);
                    }
                    Err(e) => tracing::warn!("Failed to load thumbnail for {}: {}", id, e),
                }
            }
            Message::ToggleItem(id) => {
                self.controller.toggle(&id);
            }
            Message::LoadMore => {
                let step = self.controller.load_more();
                return self.run_step(step);
            }
            Message::Done => {
                self.controller.finish();
                return Self::close();
            }
            Message::Cancel | Message::CloseRequested => {
                self.controller.cancel();
                return Self::close();
            }
            Message::SelectionReplaced(items) => {
                if !self.controller.state().is_terminal() {
                    self.controller.set_selected(items);
                }
            }
        }
        Command::none()
    }

    fn subscription(&self) -> Subscription<Message> {
        let mut subs = vec![event::listen_with(|event, _status| match event {
            Event::Keyboard(keyboard::Event::KeyPressed {
                key: keyboard::Key::Named(keyboard::key::Named::Escape),
                ..
            }) => Some(Message::Cancel),
            Event::Window(_, window::Event::CloseRequested) => Some(Message::CloseRequested),
            _ => None,
        })];

        if let Some(rx) = &self.selection_updates {
            let rx = rx.clone();
            subs.push(subscription::unfold("selection-updates", rx, |rx| async move {
                let next = rx.lock().await.recv().await;
                match next {
                    Some(items) => (Message::SelectionReplaced(items), rx),
                    // Host dropped its sender; nothing more will arrive.
                    None => futures::future::pending().await,
                }
            }));
        }

        Subscription::batch(subs)
    }

    fn view(&self) -> Element<Message> {
        let body: Element<Message> = match self.controller.state() {
            PickerState::Idle | PickerState::Authorizing => {
                text("Waiting for Instagram authorization in your browser…").size(16).into()
            }
            PickerState::Failed(error) => container(text(format!("Operation failed: {}", error)).size(16))
                .style(style::error_banner())
                .padding(10)
                .width(Length::Fill)
                .into(),
            PickerState::Ready if self.controller.media().is_empty() && !self.controller.has_more() => {
                text("No images found.").size(16).into()
            }
            _ => self.grid(),
        };

        container(column![self.header(), body].spacing(Palette::SPACING))
            .width(Length::Fill)
            .height(Length::Fill)
            .padding(20)
            .into()
    }
}
