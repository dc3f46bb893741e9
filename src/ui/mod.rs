mod media;

use crate::core::config::{Config, PlayerConfig};
use crate::core::io::{Storage, WebStorage};
use crate::core::model::{ContentSource, GenerationResult, StoryRecord, Style, Theme, Topic};
use crate::player::{PlaybackController, PlayerPhase, Reel, SeekTarget};
use crate::services::auth::AuthContext;
use crate::services::create_account_services;
use crate::services::generation::create_backend;
use crate::services::generation::fallback::FallbackContent;
use crate::services::orchestrator::{GenerationOrchestrator, GenerationStatus, PendingGeneration};
use crate::services::persistence::{save_story, StoryStore};
use crate::services::wizard::{StoryWizard, WizardStep};
use leptos::*;
use media::VideoElement;
use std::rc::Rc;
use std::sync::Arc;

const BUNDLED_CONFIG: &str = include_str!("../../config.example.yml");

#[derive(Clone)]
struct Services {
    config: Config,
    auth: AuthContext,
    store: Arc<dyn StoryStore>,
}

// `config.yml` is served next to the app; the bundled example only has
// placeholder endpoints.
async fn fetch_config() -> anyhow::Result<Config> {
    let href = window()
        .location()
        .href()
        .map_err(|e| anyhow::anyhow!("No page location: {:?}", e))?;
    let url = url::Url::parse(&href)?.join("config.yml")?;
    let body = reqwest::get(url).await?.error_for_status()?.text().await?;
    Config::parse(&body)
}

async fn load_config() -> anyhow::Result<Config> {
    match fetch_config().await {
        Ok(config) => Ok(config),
        Err(e) => {
            log::warn!("Using bundled example config, config.yml unavailable: {:#}", e);
            Config::parse(BUNDLED_CONFIG)
        }
    }
}

async fn init_services() -> anyhow::Result<Services> {
    let config = load_config().await?;
    let storage: Arc<dyn Storage> = Arc::new(WebStorage::new().await?);
    let (provider, store) = create_account_services(&config, storage)?;
    Ok(Services {
        config,
        auth: AuthContext::new(provider),
        store,
    })
}

#[component]
pub fn App() -> impl IntoView {
    let (services, set_services) = create_signal(None::<Result<Services, String>>);

    create_effect(move |_| {
        spawn_local(async move {
            let res = init_services().await.map_err(|e| format!("{:#}", e));
            set_services.set(Some(res));
        });
    });

    view! {
        <div class="app-container">
            <h1>"StoryReel"</h1>
            {move || match services.get() {
                Some(Ok(s)) => view! { <Studio services=s/> }.into_view(),
                Some(Err(e)) => view! { <p>"Failed to start: " {e}</p> }.into_view(),
                None => view! { <p>"Loading..."</p> }.into_view(),
            }}
        </div>
    }
}

/// What the player area renders; rebuilt after every controller change.
#[derive(Debug, Clone, PartialEq, Default)]
struct PlayerSnapshot {
    loaded: bool,
    loading: bool,
    playing: bool,
    ended: bool,
    progress: f64,
    label: String,
    volume: f64,
    muted: bool,
    caption: Option<String>,
    segment: Option<String>,
    blocked: Option<String>,
}

impl PlayerSnapshot {
    fn of(player: &PlaybackController<VideoElement>) -> Self {
        let state = player.state();
        let count = player.segment_count();
        Self {
            loaded: count > 0,
            loading: player.phase() == PlayerPhase::Loading,
            playing: state.is_playing,
            ended: player.phase() == PlayerPhase::Ended,
            progress: player.progress_percent(),
            label: player.time_label(),
            volume: state.volume,
            muted: state.is_muted,
            caption: player.caption().map(str::to_string),
            segment: (count > 1).then(|| format!("{} / {}", state.segment_index + 1, count)),
            blocked: player.blocked().map(|b| b.reason.clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct GenerationView {
    status: GenerationStatus,
    result: Option<GenerationResult>,
    notice: Option<String>,
    offer_retry: bool,
}

fn generation_view(orchestrator: &GenerationOrchestrator) -> GenerationView {
    GenerationView {
        status: orchestrator.status(),
        result: orchestrator.result().cloned(),
        notice: orchestrator.notice().map(|n| n.to_string()),
        offer_retry: orchestrator.should_offer_retry(),
    }
}

#[component]
fn Studio(services: Services) -> impl IntoView {
    let Services {
        config,
        auth: auth_context,
        store,
    } = services;

    let orchestrator = match create_backend(&config) {
        Ok(backend) => store_value(GenerationOrchestrator::new(
            backend,
            FallbackContent::from_config(&config.fallback),
        )),
        Err(e) => {
            return view! { <p>"Generation backend unavailable: " {format!("{:#}", e)}</p> }
                .into_view()
        }
    };
    let player_config: PlayerConfig = config.player.clone();
    let as_reel = player_config.reel;

    let wizard = create_rw_signal(StoryWizard::new());
    let auth = create_rw_signal(auth_context);
    let store = store_value(store);
    let (generation, set_generation) = create_signal(None::<GenerationView>);
    let (toast, set_toast) = create_signal(None::<String>);

    let player = store_value(None::<PlaybackController<VideoElement>>);
    let (snapshot, set_snapshot) = create_signal(PlayerSnapshot::default());

    let refresh = move || {
        let snap = player.with_value(|p| p.as_ref().map(PlayerSnapshot::of));
        set_snapshot.set(snap.unwrap_or_default());
    };
    let control = move |f: &dyn Fn(&mut PlaybackController<VideoElement>)| {
        player.update_value(|p| {
            if let Some(p) = p.as_mut() {
                f(p);
            }
        });
        refresh();
    };

    // The <video> element is rendered once and reused for every story.
    let video_ref = create_node_ref::<html::Video>();
    create_effect(move |_| {
        let Some(video) = video_ref.get() else {
            return;
        };
        if player.with_value(|p| p.is_some()) {
            return;
        }
        let video: &web_sys::HtmlVideoElement = &video;
        let video = video.clone();
        let notify: Rc<dyn Fn()> = Rc::new(move || {
            player.update_value(|p| {
                if let Some(p) = p.as_mut() {
                    p.pump();
                }
            });
            refresh();
        });
        player.set_value(Some(PlaybackController::new(
            VideoElement::new(video, notify),
            &player_config,
        )));
        refresh();
    });

    let sync_generation = move || {
        set_generation.set(orchestrator.with_value(|o| {
            (o.status() != GenerationStatus::Idle).then(|| generation_view(o))
        }));
    };

    let run_pending = move |pending: PendingGeneration| {
        sync_generation();
        spawn_local(async move {
            let resolution = pending.run().await;
            let accepted = orchestrator
                .try_update_value(|o| o.resolve(resolution))
                .unwrap_or(false);
            if accepted {
                if let Some(result) = orchestrator.with_value(|o| o.result().cloned()) {
                    control(&|p| p.load(Reel::from_result(&result, as_reel)));
                }
            }
            sync_generation();
        });
    };

    let start_generation = move |raw_topic: String| {
        let selection = wizard
            .try_update(|w| w.select_topic(&raw_topic))
            .and_then(|r| r.map_err(|e| set_toast.set(Some(e.to_string()))).ok());
        let Some(selection) = selection else {
            return;
        };
        control(&|p| p.unload());
        if let Some(pending) = orchestrator.try_update_value(|o| o.begin(selection)) {
            run_pending(pending);
        }
    };

    let regenerate = move |_| {
        if let Some(Some(pending)) = orchestrator.try_update_value(|o| o.regenerate()) {
            run_pending(pending);
        }
    };

    let back = move |_| {
        if wizard.get_untracked().step() == WizardStep::Generate {
            orchestrator.update_value(|o| o.clear());
            control(&|p| p.unload());
            sync_generation();
        }
        wizard.update(|w| {
            if let Err(e) = w.go_back() {
                log::warn!("{}", e);
            }
        });
    };

    let save = move |_| {
        let ctx = auth.get_untracked();
        let store = store.get_value();
        let (selection, result) =
            orchestrator.with_value(|o| (o.selection().cloned(), o.result().cloned()));
        let (Some(selection), Some(result)) = (selection, result) else {
            return;
        };
        spawn_local(async move {
            let message = match save_story(&ctx, store.as_ref(), &selection, &result).await {
                Ok(record) => format!("Saved \"{}\" to your stories.", record.title),
                Err(e) => format!("Could not save the story: {}", e),
            };
            set_toast.set(Some(message));
        });
    };

    let (custom_topic, set_custom_topic) = create_signal(String::new());
    let topic_error = move || {
        let raw = custom_topic.get();
        if raw.is_empty() {
            return None;
        }
        Topic::parse(&raw).err().map(|e| e.to_string())
    };

    let wizard_view = move || {
        let w = wizard.get();
        let step = w.step();
        let heading = format!("Step {} of 4", step.position());
        let body = match step {
            WizardStep::Theme => Theme::ALL
                .iter()
                .map(|t| {
                    let t = *t;
                    view! {
                        <button class="choice" on:click=move |_| wizard.update(|w| { let _ = w.select_theme(t); })>
                            <strong>{t.title()}</strong>
                            <span>{t.description()}</span>
                        </button>
                    }
                })
                .collect_view(),
            WizardStep::Style => Style::ALL
                .iter()
                .map(|s| {
                    let s = *s;
                    view! {
                        <button class="choice" on:click=move |_| wizard.update(|w| { let _ = w.select_style(s); })>
                            <strong>{s.title()}</strong>
                            <span>{s.description()}</span>
                        </button>
                    }
                })
                .collect_view(),
            WizardStep::Topic => {
                let popular = w
                    .popular_topics()
                    .into_iter()
                    .map(|t| {
                        view! {
                            <button class="topic" on:click=move |_| start_generation(t.to_string())>{t}</button>
                        }
                    })
                    .collect_view();
                view! {
                    <div class="popular">{popular}</div>
                    <input
                        type="text"
                        placeholder="Or describe your own topic"
                        prop:value=move || custom_topic.get()
                        on:input=move |ev| set_custom_topic.set(event_target_value(&ev))
                    />
                    <p class="error">{topic_error}</p>
                    <button
                        disabled=move || Topic::parse(&custom_topic.get()).is_err()
                        on:click=move |_| start_generation(custom_topic.get_untracked())
                    >
                        "Create story"
                    </button>
                }
                .into_view()
            }
            WizardStep::Generate => view! { <StoryPanel generation=generation/> }.into_view(),
        };

        view! {
            <section class="wizard">
                <h2>{heading}</h2>
                {body}
                {w.can_go_back().then(|| view! { <button class="back" on:click=back>"Back"</button> })}
            </section>
        }
    };

    let on_story_screen = move || wizard.with(|w| w.step() == WizardStep::Generate);

    view! {
        <AccountPanel auth=auth store=store set_toast=set_toast/>
        {move || toast.get().map(|t| view! { <p class="toast" on:click=move |_| set_toast.set(None)>{t}</p> })}
        {wizard_view}
        <div class="player" style:display=move || if on_story_screen() && snapshot.get().loaded { "block" } else { "none" }>
            <video node_ref=video_ref playsinline=true></video>
            <p class="caption">{move || snapshot.get().caption}</p>
            {move || snapshot.get().blocked.map(|reason| view! {
                <p class="blocked">"Playback was blocked (" {reason} "). Press play to start."</p>
            })}
            <div class="controls">
                <button on:click=move |_| control(&|p| p.toggle_play())>
                    {move || {
                        let s = snapshot.get();
                        if s.playing { "Pause" } else if s.ended { "Replay" } else { "Play" }
                    }}
                </button>
                <input
                    type="range" min="0" max="100" step="0.1"
                    prop:value=move || snapshot.get().progress
                    on:input=move |ev| {
                        let value = event_target_value(&ev).parse::<f64>().unwrap_or(0.0);
                        control(&|p| p.seek(SeekTarget::Fraction(value / 100.0)));
                    }
                />
                <span class="time">{move || snapshot.get().label}</span>
                <button on:click=move |_| control(&|p| p.toggle_mute())>
                    {move || if snapshot.get().muted { "Unmute" } else { "Mute" }}
                </button>
                <input
                    type="range" min="0" max="1" step="0.05"
                    prop:value=move || snapshot.get().volume
                    on:input=move |ev| {
                        let value = event_target_value(&ev).parse::<f64>().unwrap_or(1.0);
                        control(&|p| p.set_volume(value));
                    }
                />
                <button on:click=move |_| control(&|p| p.restart())>"Restart"</button>
                <button on:click=move |_| control(&|p| { p.advance_segment(); })>"Next"</button>
                <span class="segment">{move || snapshot.get().segment}</span>
            </div>
            <div class="actions">
                <button on:click=regenerate>"Regenerate"</button>
                <button on:click=save disabled=move || !auth.with(|a| a.can_save())>"Save"</button>
            </div>
        </div>
    }
    .into_view()
}

#[component]
fn StoryPanel(generation: ReadSignal<Option<GenerationView>>) -> impl IntoView {
    move || match generation.get() {
        None => view! { <p>"Preparing..."</p> }.into_view(),
        Some(view_state) => {
            let loading = matches!(view_state.status, GenerationStatus::Loading { .. });
            let notice = view_state.notice.clone();
            let retry = view_state.offer_retry;
            match view_state.result {
                None => view! { <p class="loading">"Creating your story..."</p> }.into_view(),
                Some(result) => {
                    let note = match &result.source {
                        ContentSource::Generated => None,
                        ContentSource::Partial { missing } => Some(format!(
                            "Some parts could not be generated ({}).",
                            missing
                                .iter()
                                .map(|m| format!("{:?}", m).to_lowercase())
                                .collect::<Vec<_>>()
                                .join(", ")
                        )),
                        ContentSource::Fallback => Some("Showing a placeholder story.".to_string()),
                    };
                    view! {
                        <article class="story">
                            <h3>{result.title.clone()}</h3>
                            {loading.then(|| view! { <p class="loading">"Writing a new version..."</p> })}
                            {note.map(|n| view! { <p class="note">{n}</p> })}
                            {retry.then(|| view! {
                                <p class="retry">
                                    "Couldn't reach the story service ("
                                    {notice.clone().unwrap_or_default()}
                                    "). Press Regenerate to try again."
                                </p>
                            })}
                            {result.image.as_ref().map(|img| view! { <img src=img.to_string() alt="Story illustration"/> })}
                            <p class="text">{result.text.clone()}</p>
                        </article>
                    }
                    .into_view()
                }
            }
        }
    }
}

#[component]
fn AccountPanel(
    auth: RwSignal<AuthContext>,
    store: StoredValue<Arc<dyn StoryStore>>,
    set_toast: WriteSignal<Option<String>>,
) -> impl IntoView {
    let (email, set_email) = create_signal(String::new());
    let (name, set_name) = create_signal(String::new());
    let (password, set_password) = create_signal(String::new());
    let (stories, set_stories) = create_signal(Vec::<StoryRecord>::new());

    let report = move |ctx: &AuthContext| {
        let message = ctx
            .last_error()
            .map(|e| e.to_string())
            .or_else(|| ctx.last_notice().map(str::to_string));
        set_toast.set(message);
    };

    let login = move |_| {
        let mut ctx = auth.get_untracked();
        spawn_local(async move {
            ctx.login(&email.get_untracked(), &password.get_untracked()).await;
            report(&ctx);
            auth.set(ctx);
        });
    };
    let signup = move |_| {
        let mut ctx = auth.get_untracked();
        spawn_local(async move {
            ctx.signup(&email.get_untracked(), &name.get_untracked(), &password.get_untracked())
                .await;
            report(&ctx);
            auth.set(ctx);
        });
    };
    let logout = move |_| {
        let mut ctx = auth.get_untracked();
        spawn_local(async move {
            ctx.logout().await;
            report(&ctx);
            set_stories.set(Vec::new());
            auth.set(ctx);
        });
    };
    let load_stories = move |_| {
        let ctx = auth.get_untracked();
        let store = store.get_value();
        spawn_local(async move {
            let Some(session) = ctx.session() else {
                return;
            };
            match store.list(session).await {
                Ok(list) if list.is_empty() => {
                    set_toast.set(Some("You haven't created any stories yet.".to_string()))
                }
                Ok(list) => set_stories.set(list),
                Err(e) => set_toast.set(Some(format!("Could not load your stories: {}", e))),
            }
        });
    };

    move || match auth.with(|a| a.current_user().map(|u| u.display_name())) {
        Some(display_name) => view! {
            <div class="account">
                <span>"Welcome, " {display_name}</span>
                <button on:click=load_stories>"My stories"</button>
                <button on:click=logout>"Sign out"</button>
                <ul class="stories">
                    {move || stories.get().into_iter().map(|s| view! {
                        <li><strong>{s.title}</strong> " (" {s.theme.title()} ", " {s.style.title()} ")"</li>
                    }).collect_view()}
                </ul>
            </div>
        }
        .into_view(),
        None => view! {
            <div class="account">
                <input type="email" placeholder="Email" on:input=move |ev| set_email.set(event_target_value(&ev))/>
                <input type="text" placeholder="Name (for sign up)" on:input=move |ev| set_name.set(event_target_value(&ev))/>
                <input type="password" placeholder="Password" on:input=move |ev| set_password.set(event_target_value(&ev))/>
                <button on:click=login>"Sign in"</button>
                <button on:click=signup>"Sign up"</button>
            </div>
        }
        .into_view(),
    }
}
