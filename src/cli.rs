use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use inquire::validator::Validation;
use inquire::{Password, Select, Text};
use rand::seq::IndexedRandom;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use storyreel::core::config::Config;
use storyreel::core::io::{NativeStorage, Storage};
use storyreel::core::model::{ContentSource, GenerationResult, MediaRef, Selection, Style, Theme, Topic};
use storyreel::player::Reel;
use storyreel::services::auth::AuthContext;
use storyreel::services::create_account_services;
use storyreel::services::generation::create_backend;
use storyreel::services::generation::fallback::FallbackContent;
use storyreel::services::orchestrator::GenerationOrchestrator;
use storyreel::services::persistence::{save_story, StoryStore};
use storyreel::services::wizard::{StoryWizard, WizardStep};

enum Choice<T> {
    Pick(T, String),
    Back,
}

impl<T> fmt::Display for Choice<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Choice::Pick(_, label) => f.write_str(label),
            Choice::Back => f.write_str("<- Back"),
        }
    }
}

#[derive(Clone, Copy)]
enum MenuItem {
    Create,
    SignIn,
    SignUp,
    MyStories,
    SignOut,
    Quit,
}

impl fmt::Display for MenuItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MenuItem::Create => "Create a story",
            MenuItem::SignIn => "Sign in",
            MenuItem::SignUp => "Create an account",
            MenuItem::MyStories => "My stories",
            MenuItem::SignOut => "Sign out",
            MenuItem::Quit => "Quit",
        })
    }
}

enum TopicChoice {
    Popular(&'static str),
    Surprise,
    Custom,
}

#[derive(Clone, Copy)]
enum StoryAction {
    Regenerate,
    Save,
    ChangeTopic,
    Done,
}

impl fmt::Display for StoryAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StoryAction::Regenerate => "Regenerate",
            StoryAction::Save => "Save to my stories",
            StoryAction::ChangeTopic => "Pick another topic",
            StoryAction::Done => "Done",
        })
    }
}

pub struct App {
    config: Config,
    wizard: StoryWizard,
    orchestrator: GenerationOrchestrator,
    auth: AuthContext,
    store: Arc<dyn StoryStore>,
}

impl App {
    pub fn new(config: Config) -> Result<Self> {
        let backend = create_backend(&config)?;
        let fallback = FallbackContent::from_config(&config.fallback);
        let storage: Arc<dyn Storage> = Arc::new(NativeStorage::new("."));
        let (provider, store) = create_account_services(&config, storage)?;

        Ok(Self {
            wizard: StoryWizard::new(),
            orchestrator: GenerationOrchestrator::new(backend, fallback),
            auth: AuthContext::new(provider),
            store,
            config,
        })
    }

    pub async fn run(&mut self) -> Result<()> {
        println!("StoryReel: turn any topic into a short illustrated story.");
        loop {
            let mut items = vec![MenuItem::Create];
            match self.auth.current_user() {
                Some(user) => {
                    println!("\nWelcome, {}", user.display_name());
                    items.extend([MenuItem::MyStories, MenuItem::SignOut]);
                }
                None => items.extend([MenuItem::SignIn, MenuItem::SignUp]),
            }
            items.push(MenuItem::Quit);

            let Some(choice) = Select::new("What would you like to do?", items).prompt_skippable()?
            else {
                return Ok(());
            };
            match choice {
                MenuItem::Create => self.create_story().await?,
                MenuItem::SignIn => self.sign_in().await?,
                MenuItem::SignUp => self.sign_up().await?,
                MenuItem::MyStories => self.my_stories().await?,
                MenuItem::SignOut => {
                    self.auth.logout().await;
                    self.report_auth();
                }
                MenuItem::Quit => return Ok(()),
            }
        }
    }

    // --- Story creation ---

    async fn create_story(&mut self) -> Result<()> {
        self.wizard.reset();
        self.orchestrator.clear();

        loop {
            let Some(selection) = self.run_wizard()? else {
                self.orchestrator.clear();
                return Ok(());
            };

            self.generate(selection).await?;

            if self.story_actions().await? {
                self.wizard.go_back()?;
                continue;
            }
            self.orchestrator.clear();
            self.wizard.reset();
            return Ok(());
        }
    }

    /// Walks the wizard until a topic is picked. `None` when the user backs
    /// out of the first step.
    fn run_wizard(&mut self) -> Result<Option<Selection>> {
        loop {
            let step = self.wizard.step();
            let label = |what: &str| format!("Step {} of 4: {}", step.position(), what);

            match step {
                WizardStep::Theme => {
                    let mut options: Vec<Choice<Theme>> = Theme::ALL
                        .iter()
                        .map(|t| Choice::Pick(*t, format!("{} ({})", t.title(), t.description())))
                        .collect();
                    options.push(Choice::Back);
                    match Select::new(&label("choose a theme"), options).prompt_skippable()? {
                        Some(Choice::Pick(theme, _)) => {
                            self.wizard.select_theme(theme)?;
                        }
                        Some(Choice::Back) | None => return Ok(None),
                    }
                }
                WizardStep::Style => {
                    let mut options: Vec<Choice<Style>> = Style::ALL
                        .iter()
                        .map(|s| Choice::Pick(*s, format!("{} ({})", s.title(), s.description())))
                        .collect();
                    options.push(Choice::Back);
                    match Select::new(&label("choose a visual style"), options).prompt_skippable()? {
                        Some(Choice::Pick(style, _)) => {
                            self.wizard.select_style(style)?;
                        }
                        Some(Choice::Back) | None => {
                            self.wizard.go_back()?;
                        }
                    }
                }
                WizardStep::Topic => {
                    let Some(topic) = self.ask_topic(&label("what should the story be about?"))?
                    else {
                        self.wizard.go_back()?;
                        continue;
                    };
                    match self.wizard.select_topic(&topic) {
                        Ok(selection) => return Ok(Some(selection)),
                        Err(e) => println!("{}", e),
                    }
                }
                WizardStep::Generate => return Ok(self.wizard.selection()),
            }
        }
    }

    fn ask_topic(&self, prompt: &str) -> Result<Option<String>> {
        let popular = self.wizard.popular_topics();
        let mut options: Vec<Choice<TopicChoice>> = popular
            .iter()
            .map(|t| Choice::Pick(TopicChoice::Popular(*t), t.to_string()))
            .collect();
        options.push(Choice::Pick(TopicChoice::Surprise, "Surprise me".to_string()));
        options.push(Choice::Pick(TopicChoice::Custom, "Write my own topic".to_string()));
        options.push(Choice::Back);

        let topic = match Select::new(prompt, options).prompt_skippable()? {
            Some(Choice::Pick(TopicChoice::Popular(t), _)) => t.to_string(),
            Some(Choice::Pick(TopicChoice::Surprise, _)) => popular
                .choose(&mut rand::rng())
                .map(|t| t.to_string())
                .context("No topics to pick from")?,
            Some(Choice::Pick(TopicChoice::Custom, _)) => {
                let custom = Text::new("Your topic:")
                    .with_help_message("For example: a friendly robot learning to paint")
                    .with_validator(|input: &str| {
                        Ok(match Topic::parse(input) {
                            Ok(_) => Validation::Valid,
                            Err(e) => Validation::Invalid(e.to_string().into()),
                        })
                    })
                    .prompt_skippable()?;
                match custom {
                    Some(text) => text,
                    None => return self.ask_topic(prompt),
                }
            }
            Some(Choice::Back) | None => return Ok(None),
        };
        Ok(Some(topic))
    }

    async fn generate(&mut self, selection: Selection) -> Result<()> {
        let spinner = spinner(format!(
            "Creating your {} story about {}...",
            selection.theme, selection.topic
        ))?;
        let result = self.orchestrator.request_generation(selection).await;
        spinner.finish_and_clear();
        self.show_result(&result);
        Ok(())
    }

    /// Offers follow-ups for the displayed story. Returns `true` when the user
    /// wants to go back and pick another topic.
    async fn story_actions(&mut self) -> Result<bool> {
        loop {
            let actions = vec![
                StoryAction::Regenerate,
                StoryAction::Save,
                StoryAction::ChangeTopic,
                StoryAction::Done,
            ];
            let Some(action) = Select::new("What next?", actions).prompt_skippable()? else {
                return Ok(false);
            };

            match action {
                StoryAction::Regenerate => {
                    let spinner = spinner("Writing a new version...".to_string())?;
                    let result = self.orchestrator.regenerate_now().await;
                    spinner.finish_and_clear();
                    if let Some(result) = result {
                        self.show_result(&result);
                    }
                }
                StoryAction::Save => self.save().await,
                StoryAction::ChangeTopic => return Ok(true),
                StoryAction::Done => return Ok(false),
            }
        }
    }

    async fn save(&self) {
        let (Some(selection), Some(result)) =
            (self.orchestrator.selection(), self.orchestrator.result())
        else {
            return;
        };
        match save_story(&self.auth, self.store.as_ref(), selection, result).await {
            Ok(record) => println!("Saved \"{}\" to your stories.", record.title),
            Err(e) => println!("Could not save the story: {}. You can try again.", e),
        }
    }

    fn show_result(&self, result: &GenerationResult) {
        println!("\n=== {} ===\n", result.title);
        let reel = Reel::from_result(result, self.config.player.reel);
        if reel.len() > 1 {
            for index in 0..reel.len() {
                if let Some(caption) = reel.segment(index).and_then(|s| s.caption.as_deref()) {
                    println!("[{}/{}] {}\n", index + 1, reel.len(), caption);
                }
            }
        } else {
            println!("{}\n", result.text);
        }

        println!("Video: {}", describe_media(&result.media_ref));
        if let Some(image) = &result.image {
            println!("Illustration: {}", describe_media(image));
        }
        if let ContentSource::Partial { missing } = &result.source {
            let fields: Vec<String> = missing.iter().map(|m| format!("{:?}", m).to_lowercase()).collect();
            println!("(Some parts could not be generated: {})", fields.join(", "));
        }

        if self.orchestrator.should_offer_retry() {
            if let Some(notice) = self.orchestrator.notice() {
                println!(
                    "Couldn't reach the story service ({}). Showing a placeholder story; choose Regenerate to try again.",
                    notice
                );
            }
        } else if result.source == ContentSource::Fallback {
            println!("(Showing a placeholder story.)");
        }
        println!();
    }

    // --- Account ---

    async fn sign_in(&mut self) -> Result<()> {
        let Some(email) = Text::new("Email:").prompt_skippable()? else {
            return Ok(());
        };
        let Some(password) = Password::new("Password:")
            .without_confirmation()
            .prompt_skippable()?
        else {
            return Ok(());
        };
        self.auth.login(&email, &password).await;
        self.report_auth();
        Ok(())
    }

    async fn sign_up(&mut self) -> Result<()> {
        let Some(name) = Text::new("Name:").prompt_skippable()? else {
            return Ok(());
        };
        let Some(email) = Text::new("Email:").prompt_skippable()? else {
            return Ok(());
        };
        let Some(password) = Password::new("Password:").prompt_skippable()? else {
            return Ok(());
        };
        self.auth.signup(&email, &name, &password).await;
        self.report_auth();
        Ok(())
    }

    fn report_auth(&self) {
        if let Some(e) = self.auth.last_error() {
            println!("{}", e);
        } else if let Some(notice) = self.auth.last_notice() {
            println!("{}", notice);
        }
    }

    async fn my_stories(&self) -> Result<()> {
        let Some(session) = self.auth.session() else {
            println!("Sign in to see your stories.");
            return Ok(());
        };
        let stories = match self.store.list(session).await {
            Ok(stories) => stories,
            Err(e) => {
                println!("Could not load your stories: {}", e);
                return Ok(());
            }
        };
        if stories.is_empty() {
            println!("You haven't created any stories yet.");
            return Ok(());
        }

        let mut options: Vec<Choice<usize>> = stories
            .iter()
            .enumerate()
            .map(|(i, s)| Choice::Pick(i, format!("{} [{} / {}]", s.title, s.theme, s.style)))
            .collect();
        options.push(Choice::Back);

        if let Some(Choice::Pick(index, _)) =
            Select::new("Your stories", options).prompt_skippable()?
        {
            let story = &stories[index];
            println!("\n=== {} ===\n\n{}\n", story.title, story.story);
            println!("Video: {}", describe_media(&story.video_url));
            println!("Thumbnail: {}\n", story.thumbnail);
        }
        Ok(())
    }
}

fn spinner(message: String) -> Result<ProgressBar> {
    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}")?);
    pb.set_message(message);
    pb.enable_steady_tick(Duration::from_millis(100));
    Ok(pb)
}

fn describe_media(media: &MediaRef) -> String {
    match media {
        MediaRef::Url(url) => url.to_string(),
        MediaRef::Inline { mime, data } => {
            format!("inline {} ({} KB)", mime, data.len() * 3 / 4 / 1024)
        }
    }
}
