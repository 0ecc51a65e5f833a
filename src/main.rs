use anyhow::{Context, Result};
use clap::Parser;
use padlayer::input::{
    ActionSlot, BindingSet, Button, Command, Direction, Engine, FrameOutput, Host, InputSnapshot,
    KeyCode, LayerDef, LayerId, MenuId, MenuRequest, Profile, TextId,
};
use padlayer::{log_info, log_warning, Cli, EngineConfig};

const COMBAT: LayerId = LayerId(1);
const MENU: LayerId = LayerId(2);

/// Host that narrates immediate dispatches
struct ConsoleHost;

impl Host for ConsoleHost {
    fn hold_key(&mut self, key: KeyCode, down: bool) {
        println!("          key {} {}", key.0, if down { "down" } else { "up" });
    }

    fn menu(&mut self, request: MenuRequest) -> Option<Command> {
        log_info!("Menu request: {:?}", request);
        None
    }
}

fn demo_profile() -> Profile {
    let root = LayerDef::new("root")
        .bind(Button::A, ActionSlot::Down, Command::HoldLayer(COMBAT))
        .bind_set(
            Button::B,
            BindingSet::new()
                .with(ActionSlot::Tap, Command::TapKey(KeyCode(1)))
                .with(ActionSlot::Hold, Command::HoldKey(KeyCode(2)))
                .with_hold_time(300),
        )
        .bind(Button::Start, ActionSlot::Press, Command::ToggleLayer(MENU))
        .bind(Button::DPad, ActionSlot::Down, Command::MoveTurn(Direction::Up));

    let mut profile = Profile::new(root);
    profile.add_layer(
        LayerDef::new("combat")
            .bind(Button::B, ActionSlot::Tap, Command::TapKey(KeyCode(23)))
            .bind_auto(ActionSlot::Press, Command::ChatText(TextId(0))),
    );
    profile.add_layer(
        LayerDef::new("menu")
            .with_priority(1)
            .bind_set(
                Button::DPad,
                BindingSet::new().with(
                    ActionSlot::Press,
                    Command::MenuNavigate {
                        dir: Direction::Up,
                        count: 1,
                        wrap: true,
                    },
                ),
            )
            .bind(Button::A, ActionSlot::Press, Command::MenuConfirm)
            .bind_auto(ActionSlot::Press, Command::MenuOpen(MenuId(0)))
            .bind_auto(ActionSlot::Release, Command::MenuClose),
    );
    profile
}

/// Scripted controller input for one frame
fn script(frame: u32) -> InputSnapshot {
    let input = InputSnapshot::new();
    match frame {
        0 => input.press(Button::A),
        1 => input.hold(Button::A).tap(Button::B),
        3 => input.tap(Button::B),
        4 => input.press(Button::B),
        5..=7 => input.hold(Button::B),
        8 => input.tap(Button::Start),
        9 => input.press(Button::DPadDown),
        10..=14 => input.hold(Button::DPadDown),
        15 => input.tap(Button::Start),
        16 => input.press(Button::DPadLeft).analog(Button::LStickUp, 128),
        _ => input,
    }
}

fn print_frame(frame: u32, out: &FrameOutput, verbose: bool) {
    if out.is_empty() && !verbose {
        return;
    }
    println!("frame {:>3}:", frame);
    for action in &out.actions {
        println!("          {:?}", action);
    }
    if !out.axes.is_idle() {
        println!("          axes {:?}", out.axes);
    }
    if let Some(dir) = out.hotspot {
        println!("          hotspot {:?}", dir);
    }
    if !out.changed_layers.is_empty() {
        println!("          layers changed {:?}", out.changed_layers);
    }
    for effect in &out.effects {
        println!("          {:?}", effect);
    }
    if let Some(ref fault) = out.fault {
        println!("          fault: {}", fault);
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    env_logger::Builder::new()
        .filter_level(cli.log_level()?.to_level_filter())
        .init();

    let config = cli.merge_into_config(EngineConfig::default())?;
    let frame_ms = cli.frame_duration()?;
    log_info!("Configuration: {:?}", config);

    let mut engine =
        Engine::new(demo_profile(), config).context("Failed to build the demo profile")?;
    let mut host = ConsoleHost;

    for frame in 0..cli.frame_count() {
        let out = engine.update(&script(frame), &mut host, frame_ms);
        print_frame(frame, &out, cli.verbose);
        if engine.is_halted() {
            log_warning!("Layer processing halted at frame {}", frame);
        }
    }

    engine.cleanup(&mut host);
    log_info!("Active layers after cleanup: {:?}", engine.layer_order());
    Ok(())
}
