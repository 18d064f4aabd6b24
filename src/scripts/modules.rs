//! Engine modules exposed to every script: `print`, extra `math` helpers,
//! `vec2` and `gfx`.
//!
//! The drawing module is not called `draw` because that name belongs to the
//! render hook every class defines.

use glam::{DVec2, Vec2, Vec4};
use log::info;
use mlua::{
    AnyUserData, Error as LuaError, Function, Lua, Result as LuaResult, Table, UserData, UserDataMethods,
    Value, Variadic,
};

use crate::renderer::{DrawCommand, Renderer};

/// Registry slot holding the renderer of the `render` call in progress.
pub(crate) const ACTIVE_RENDERER_KEY: &str = "arcade.active_renderer";
const BIND_ENV_KEY: &str = "arcade.bind_env";

pub fn install(lua: &Lua) -> LuaResult<()> {
    install_print(lua)?;
    install_math(lua)?;
    install_vec2(lua)?;
    install_gfx(lua)?;
    install_env_binder(lua)?;
    Ok(())
}

/// Points a script function's globals at `env`. Native functions have no
/// environment and are left alone.
pub(crate) fn set_function_env<'lua>(lua: &'lua Lua, func: &Function<'lua>, env: &Table<'lua>) -> LuaResult<()> {
    let bind: Function = lua.named_registry_value(BIND_ENV_KEY)?;
    bind.call::<_, ()>((func.clone(), env.clone()))
}

fn install_env_binder(lua: &Lua) -> LuaResult<()> {
    let bind: Function = lua
        .load("local setfenv, pcall = setfenv, pcall\nreturn function(f, env) pcall(setfenv, f, env) end")
        .set_name("bind_env")
        .eval()?;
    lua.set_named_registry_value(BIND_ENV_KEY, bind)
}

fn install_print(lua: &Lua) -> LuaResult<()> {
    let print = lua.create_function(|_, args: Variadic<Value>| {
        let line: Vec<String> = args.iter().map(display_value).collect();
        info!("[script] {}", line.join("\t"));
        Ok(())
    })?;
    lua.globals().set("print", print)
}

fn display_value(value: &Value<'_>) -> String {
    match value {
        Value::Nil => "nil".to_string(),
        Value::Boolean(value) => value.to_string(),
        Value::Integer(value) => value.to_string(),
        Value::Number(value) => value.to_string(),
        Value::String(value) => String::from_utf8_lossy(value.as_bytes()).into_owned(),
        other => other.type_name().to_string(),
    }
}

fn install_math(lua: &Lua) -> LuaResult<()> {
    let math: Table = lua.globals().get("math")?;
    math.set("lerp", lua.create_function(|_, (a, b, t): (f64, f64, f64)| Ok(a + (b - a) * t))?)?;
    math.set(
        "clamp",
        lua.create_function(|_, (value, min, max): (f64, f64, f64)| Ok(value.max(min).min(max)))?,
    )?;
    math.set("wrap_angle", lua.create_function(|_, radians: f64| Ok(wrap_angle(radians)))?)?;
    math.set(
        "sign",
        lua.create_function(|_, value: f64| {
            Ok(if value > 0.0 {
                1.0
            } else if value < 0.0 {
                -1.0
            } else {
                0.0
            })
        })?,
    )?;
    Ok(())
}

pub(crate) fn wrap_angle(mut radians: f64) -> f64 {
    let two_pi = 2.0 * std::f64::consts::PI;
    while radians > std::f64::consts::PI {
        radians -= two_pi;
    }
    while radians < -std::f64::consts::PI {
        radians += two_pi;
    }
    radians
}

fn install_vec2(lua: &Lua) -> LuaResult<()> {
    let vec2 = lua.create_table()?;
    vec2.set("length", lua.create_function(|_, (x, y): (f64, f64)| Ok(DVec2::new(x, y).length()))?)?;
    vec2.set(
        "normalize",
        lua.create_function(|_, (x, y): (f64, f64)| {
            let v = DVec2::new(x, y).normalize_or_zero();
            Ok((v.x, v.y))
        })?,
    )?;
    vec2.set(
        "dot",
        lua.create_function(|_, (ax, ay, bx, by): (f64, f64, f64, f64)| {
            Ok(DVec2::new(ax, ay).dot(DVec2::new(bx, by)))
        })?,
    )?;
    vec2.set(
        "distance",
        lua.create_function(|_, (ax, ay, bx, by): (f64, f64, f64, f64)| {
            Ok(DVec2::new(ax, ay).distance(DVec2::new(bx, by)))
        })?,
    )?;
    vec2.set(
        "rotate",
        lua.create_function(|_, (x, y, angle): (f64, f64, f64)| {
            let v = DVec2::from_angle(angle).rotate(DVec2::new(x, y));
            Ok((v.x, v.y))
        })?,
    )?;
    vec2.set("angle", lua.create_function(|_, (x, y): (f64, f64)| Ok(y.atan2(x)))?)?;
    vec2.set(
        "lerp",
        lua.create_function(|_, (ax, ay, bx, by, t): (f64, f64, f64, f64, f64)| {
            let v = DVec2::new(ax, ay).lerp(DVec2::new(bx, by), t);
            Ok((v.x, v.y))
        })?,
    )?;
    lua.globals().set("vec2", vec2)
}

/// `gfx.*` forwards to the renderer bound for the current `render` call and
/// raises a script error anywhere else.
fn install_gfx(lua: &Lua) -> LuaResult<()> {
    let active = lua.create_function(|lua, method: String| {
        let active: Option<AnyUserData> = lua.named_registry_value(ACTIVE_RENDERER_KEY)?;
        active.ok_or_else(|| LuaError::RuntimeError(format!("gfx.{method} called outside of render")))
    })?;
    let gfx: Table = lua.load(GFX_MODULE).set_name("gfx").call(active)?;
    lua.globals().set("gfx", gfx)
}

const GFX_MODULE: &str = r#"
local active = ...
local gfx = {}
for _, name in ipairs({ "clear", "color", "rect", "line", "text", "viewport" }) do
    gfx[name] = function(...)
        local renderer = active(name)
        return renderer[name](renderer, ...)
    end
end
return gfx
"#;

/// Script-side view of a [`Renderer`] for the duration of one `render` call.
pub(crate) struct RendererBinding<'a> {
    sink: &'a mut dyn Renderer,
    color: Vec4,
}

impl<'a> RendererBinding<'a> {
    pub(crate) fn new(sink: &'a mut dyn Renderer) -> Self {
        Self { sink, color: Vec4::ONE }
    }
}

impl UserData for RendererBinding<'_> {
    fn add_methods<'lua, M: UserDataMethods<'lua, Self>>(methods: &mut M) {
        methods.add_method_mut("color", |_, this, (r, g, b, a): (f32, f32, f32, Option<f32>)| {
            this.color = Vec4::new(r, g, b, a.unwrap_or(1.0));
            Ok(())
        });
        methods.add_method_mut(
            "clear",
            |_, this, (r, g, b, a): (Option<f32>, Option<f32>, Option<f32>, Option<f32>)| {
                let color = match (r, g, b) {
                    (Some(r), Some(g), Some(b)) => Vec4::new(r, g, b, a.unwrap_or(1.0)),
                    _ => this.color,
                };
                this.sink.submit(DrawCommand::clear(color));
                Ok(())
            },
        );
        methods.add_method_mut("rect", |_, this, (x, y, w, h): (f32, f32, f32, f32)| {
            let color = this.color;
            this.sink.submit(DrawCommand::rect(Vec2::new(x, y), Vec2::new(w, h), color));
            Ok(())
        });
        methods.add_method_mut("line", |_, this, (x1, y1, x2, y2, width): (f32, f32, f32, f32, Option<f32>)| {
            let color = this.color;
            this.sink.submit(DrawCommand::line(Vec2::new(x1, y1), Vec2::new(x2, y2), width.unwrap_or(1.0), color));
            Ok(())
        });
        methods.add_method_mut("text", |_, this, (x, y, text): (f32, f32, String)| {
            let color = this.color;
            this.sink.submit(DrawCommand::text(Vec2::new(x, y), text, color));
            Ok(())
        });
        methods.add_method("viewport", |_, this, ()| {
            let size = this.sink.viewport();
            Ok((size.x, size.y))
        });
    }
}
