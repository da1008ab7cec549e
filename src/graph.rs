//! 转码管线构建
//!
//! 推流请求先被解析成一组有序的滤镜阶段 (`Stage`)，每个阶段记录自己的
//! 上游/下游标签，最后才序列化成 FFmpeg 的 `-filter_complex` 文本。
//! 阶段顺序固定：基础缩放 → 缩放特效 → 文字 → 打码 → 台标 → 输出。
//! 未启用的阶段直接跳过，由下一个阶段接上前一阶段的输出标签。

use crate::config::EncoderConfig;
use crate::error::{StreamError, StreamResult};
use crate::overlay::{Animation, TextOverlayStyle};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;
use std::path::{Path, PathBuf};

/// 规范输出分辨率
pub const FRAME_WIDTH: u32 = 1920;
pub const FRAME_HEIGHT: u32 = 1080;

/// 最终视频输出标签，`-map [v]`
pub const OUTPUT_LABEL: &str = "v";

const MAX_ZOOM: u32 = 2;
const BOUNCE_SPEED_X: u32 = 200;
const BOUNCE_SPEED_Y: u32 = 100;
const SLIDE_SPEED: u32 = 100;
const SLIDE_BOTTOM_MARGIN: u32 = 20;
const TEXT_BOX_BORDER: u32 = 5;
const BLUR_STRENGTH: &str = "20:3";
const LOGO_FRACTION: f64 = 0.15;
const LOGO_MARGIN: u32 = 20;

/// 需要打码的矩形区域 (规范分辨率下的像素坐标)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlurRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl BlurRegion {
    pub fn validate(&self) -> StreamResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(StreamError::validation(
                "Blur region width and height must be positive",
            ));
        }
        let right = self.x.checked_add(self.width);
        let bottom = self.y.checked_add(self.height);
        match (right, bottom) {
            (Some(r), Some(b)) if r <= FRAME_WIDTH && b <= FRAME_HEIGHT => Ok(()),
            _ => Err(StreamError::validation(format!(
                "Blur region must fit inside {}x{}",
                FRAME_WIDTH, FRAME_HEIGHT
            ))),
        }
    }

    /// 兼容旧客户端提交的 `crop=w=..:h=..:x=..:y=..` 片段
    pub fn from_crop_expr(expr: &str) -> Option<Self> {
        let start = expr.find("crop=")? + "crop=".len();
        let body = &expr[start..];
        let body = body.split([',', '[', ';']).next()?;

        let (mut w, mut h, mut x, mut y) = (None, None, None, None);
        for part in body.split(':') {
            let (key, value) = part.split_once('=')?;
            let value: u32 = value.trim().parse().ok()?;
            match key.trim() {
                "w" => w = Some(value),
                "h" => h = Some(value),
                "x" => x = Some(value),
                "y" => y = Some(value),
                _ => return None,
            }
        }
        Some(Self {
            x: x?,
            y: y?,
            width: w?,
            height: h?,
        })
    }
}

/// 台标锚定的角落
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LogoPosition {
    TopLeft,
    TopRight,
    BottomLeft,
    #[default]
    BottomRight,
}

impl LogoPosition {
    /// 解析客户端传来的位置，未知取值回落到右下角
    pub fn parse_lenient(value: &str) -> Self {
        match value {
            "top-left" => Self::TopLeft,
            "top-right" => Self::TopRight,
            "bottom-left" => Self::BottomLeft,
            _ => Self::BottomRight,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TopLeft => "top-left",
            Self::TopRight => "top-right",
            Self::BottomLeft => "bottom-left",
            Self::BottomRight => "bottom-right",
        }
    }

    fn overlay_expr(&self) -> String {
        let m = LOGO_MARGIN;
        let max_x = FRAME_WIDTH - LOGO_MARGIN;
        let max_y = FRAME_HEIGHT - LOGO_MARGIN;
        let right = format!("min(W-w-{m}\\,{max_x})");
        let bottom = format!("min(H-h-{m}\\,{max_y})");
        match self {
            Self::TopLeft => format!("{m}:{m}"),
            Self::TopRight => format!("{right}:{m}"),
            Self::BottomLeft => format!("{m}:{bottom}"),
            Self::BottomRight => format!("{right}:{bottom}"),
        }
    }
}

/// 对嵌入滤镜描述中的路径做转义
pub fn escape_path(path: &Path) -> String {
    let raw = path.to_string_lossy();
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '"' | '\'' | '$' | '`' | '\\') || c.is_whitespace() {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// 文字叠加阶段参数
#[derive(Debug, Clone, PartialEq)]
pub struct TextStage {
    /// 引擎每帧重新读取的消息文件
    pub message_file: PathBuf,
    pub font_file: PathBuf,
    pub style: TextOverlayStyle,
}

impl TextStage {
    fn border(&self) -> u32 {
        if self.style.enable_background {
            TEXT_BOX_BORDER
        } else {
            0
        }
    }

    /// 单轴三角波：在 [0, frame - text - 2*border] 之间往返
    fn bounce_axis(speed: u32, frame: &str, text: &str, border: u32) -> String {
        let (span, offset) = if border > 0 {
            (format!("{frame}-{text}-{}", 2 * border), format!("+{border}"))
        } else {
            (format!("{frame}-{text}"), String::new())
        };
        format!(
            "if(lte(mod(t*{speed}\\,2*({span}))\\,{span})\\,mod(t*{speed}\\,{span}){offset}\\,2*({span})-mod(t*{speed}\\,2*({span})){offset})"
        )
    }

    fn position(&self) -> (String, String) {
        let border = self.border();
        let bottom = if border > 0 {
            format!("H-th-{SLIDE_BOTTOM_MARGIN}-{border}")
        } else {
            format!("H-th-{SLIDE_BOTTOM_MARGIN}")
        };
        match self.style.animation {
            Animation::Bounce => (
                Self::bounce_axis(BOUNCE_SPEED_X, "W", "tw", border),
                Self::bounce_axis(BOUNCE_SPEED_Y, "H", "th", border),
            ),
            Animation::SlideLeft => (format!("W-mod(t*{SLIDE_SPEED}\\,W+tw)"), bottom),
            Animation::SlideRight => (format!("-tw+mod(t*{SLIDE_SPEED}\\,W+tw)"), bottom),
        }
    }

    fn drawtext(&self) -> String {
        let (x, y) = self.position();
        let mut filter = format!(
            "drawtext=textfile='{}':fontfile='{}':fontsize={}:fontcolor={}:reload=1",
            escape_path(&self.message_file),
            escape_path(&self.font_file),
            self.style.font_size,
            self.style.text_color,
        );
        if self.style.enable_background {
            filter.push_str(&format!(
                ":box=1:boxcolor={}:boxborderw={}",
                self.style.background_color,
                self.border()
            ));
        }
        filter.push_str(&format!(":x='{x}':y='{y}'"));
        filter
    }
}

/// 滤镜图中的一个阶段
#[derive(Debug, Clone, PartialEq)]
pub enum Stage {
    /// 统一缩放到 1920x1080 并加黑边
    BaseScale { input_index: usize },
    /// 持续放大并叠加回原画面，`step` 为每帧放大增量
    Zoom { step: f64 },
    Text(TextStage),
    Blur(BlurRegion),
    Logo {
        input_index: usize,
        position: LogoPosition,
    },
    /// 仅在没有任何特效阶段时用于产出最终标签
    Passthrough,
}

impl Stage {
    fn default_label(&self) -> &'static str {
        match self {
            Self::BaseScale { .. } => "scaled",
            Self::Zoom { .. } => "zoombase",
            Self::Text(_) => "withtext",
            Self::Blur(_) => "blurred_out",
            Self::Logo { .. } => "logo_out",
            Self::Passthrough => OUTPUT_LABEL,
        }
    }

    fn render(&self, input: &str, output: &str) -> String {
        let (w, h) = (FRAME_WIDTH, FRAME_HEIGHT);
        match self {
            Self::BaseScale { input_index } => format!(
                "[{input_index}:v]scale={w}:{h}:force_original_aspect_ratio=decrease,pad={w}:{h}:(ow-iw)/2:(oh-ih)/2[{output}]"
            ),
            Self::Zoom { step } => format!(
                "[{input}]split[toZoom][base];\
                 [toZoom]scale={w}*2:{h}*2,zoompan=z='min(zoom+{step},{MAX_ZOOM})':d=1:x='iw/4':y='ih/4',scale={w}:{h}[zoomed];\
                 [base][zoomed]overlay=(W-w)/2:(H-h)/2[{output}]"
            ),
            Self::Text(text) => format!("[{input}]{}[{output}]", text.drawtext()),
            Self::Blur(r) => format!(
                "[{input}]split[main][for_blur];\
                 [for_blur]crop=w={}:h={}:x={}:y={},boxblur={BLUR_STRENGTH}[blurred];\
                 [main][blurred]overlay=x={}:y={}[{output}]",
                r.width, r.height, r.x, r.y, r.x, r.y
            ),
            Self::Logo {
                input_index,
                position,
            } => {
                let factor = format!("min({w}*{LOGO_FRACTION}/iw\\,{h}*{LOGO_FRACTION}/ih)");
                format!(
                    "[{input_index}:v]scale=iw*{factor}:ih*{factor}[scaledlogo];\
                     [{input}][scaledlogo]overlay={}[{output}]",
                    position.overlay_expr()
                )
            }
            Self::Passthrough => format!("[{input}]null[{output}]"),
        }
    }
}

/// 带上下游标签的滤镜节点
#[derive(Debug, Clone, PartialEq)]
pub struct FilterNode {
    pub stage: Stage,
    pub input: String,
    pub output: String,
}

/// 有序滤镜图
#[derive(Debug, Clone, PartialEq)]
pub struct FilterGraph {
    nodes: Vec<FilterNode>,
}

impl FilterGraph {
    pub fn nodes(&self) -> &[FilterNode] {
        &self.nodes
    }

    pub fn output_label(&self) -> &str {
        self.nodes
            .last()
            .map(|n| n.output.as_str())
            .unwrap_or(OUTPUT_LABEL)
    }
}

impl fmt::Display for FilterGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, node) in self.nodes.iter().enumerate() {
            if i > 0 {
                f.write_str(";")?;
            }
            f.write_str(&node.stage.render(&node.input, &node.output))?;
        }
        Ok(())
    }
}

pub struct FilterGraphBuilder {
    nodes: Vec<FilterNode>,
}

impl FilterGraphBuilder {
    /// 以基础缩放阶段开始，`video_input` 为主视频输入序号
    pub fn new(video_input: usize) -> Self {
        let stage = Stage::BaseScale {
            input_index: video_input,
        };
        let node = FilterNode {
            input: format!("{video_input}:v"),
            output: stage.default_label().to_string(),
            stage,
        };
        Self { nodes: vec![node] }
    }

    /// 追加一个阶段，上游为当前最后一个阶段的输出
    pub fn push(mut self, stage: Stage) -> Self {
        let input = self
            .nodes
            .last()
            .map(|n| n.output.clone())
            .unwrap_or_default();
        self.nodes.push(FilterNode {
            output: stage.default_label().to_string(),
            input,
            stage,
        });
        self
    }

    pub fn push_if(self, stage: Option<Stage>) -> Self {
        match stage {
            Some(stage) => self.push(stage),
            None => self,
        }
    }

    pub fn finish(mut self) -> FilterGraph {
        if self.nodes.len() == 1 {
            self = self.push(Stage::Passthrough);
        }
        if let Some(last) = self.nodes.last_mut() {
            last.output = OUTPUT_LABEL.to_string();
        }
        FilterGraph { nodes: self.nodes }
    }
}

/// 主视频来源
#[derive(Debug, Clone, PartialEq)]
pub enum PrimarySource {
    /// 远程地址 (直接填写或从 M3U 列表中选中)
    Url(String),
    /// 本地多文件循环，指向 concat 列表文件
    ConcatList(PathBuf),
}

#[derive(Debug, Clone, PartialEq)]
pub struct LogoOverlay {
    pub path: PathBuf,
    pub position: LogoPosition,
}

/// 构建管线所需的全部已校验输入
#[derive(Debug, Clone)]
pub struct PipelinePlan {
    pub source: PrimarySource,
    pub destination: String,
    pub audio_track: Option<PathBuf>,
    pub zoom: Option<f64>,
    pub blur: Option<BlurRegion>,
    pub logo: Option<LogoOverlay>,
    pub text: TextStage,
    pub encoder: EncoderConfig,
}

/// 可直接交给进程管理器执行的命令
#[derive(Debug, Clone)]
pub struct PipelineSpec {
    pub program: String,
    pub args: Vec<String>,
    /// 完整推流地址，用于推导平台名称
    pub destination: String,
}

impl PipelineSpec {
    pub fn command_line(&self) -> String {
        let mut line = self.program.clone();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}

fn push_args<const N: usize>(args: &mut Vec<String>, items: [&str; N]) {
    args.extend(items.iter().map(|s| s.to_string()));
}

/// 输入序号与滤镜图
pub fn build_graph(plan: &PipelinePlan) -> FilterGraph {
    let video_input = usize::from(plan.audio_track.is_some());
    let logo_input = video_input + 1;

    FilterGraphBuilder::new(video_input)
        .push_if(plan.zoom.map(|step| Stage::Zoom { step }))
        .push(Stage::Text(plan.text.clone()))
        .push_if(plan.blur.map(Stage::Blur))
        .push_if(plan.logo.as_ref().map(|logo| Stage::Logo {
            input_index: logo_input,
            position: logo.position,
        }))
        .finish()
}

/// 生成完整的 FFmpeg 参数列表
///
/// 输入顺序：替换音轨 (可选) → 主视频 → 台标 (可选)。
pub fn build_pipeline(program: &str, plan: &PipelinePlan) -> PipelineSpec {
    let mut args = vec!["-hide_banner".to_string()];

    if let Some(audio) = &plan.audio_track {
        push_args(&mut args, ["-stream_loop", "-1", "-i"]);
        args.push(audio.to_string_lossy().into_owned());
    }

    match &plan.source {
        PrimarySource::Url(url) => {
            push_args(&mut args, ["-stream_loop", "-1", "-i"]);
            args.push(url.clone());
        }
        PrimarySource::ConcatList(list) => {
            push_args(
                &mut args,
                ["-f", "concat", "-safe", "0", "-stream_loop", "-1", "-i"],
            );
            args.push(list.to_string_lossy().into_owned());
        }
    }

    if let Some(logo) = &plan.logo {
        args.push("-i".to_string());
        args.push(logo.path.to_string_lossy().into_owned());
    }

    let graph = build_graph(plan);
    let chain: Vec<String> = graph
        .nodes()
        .iter()
        .map(|n| format!("{}->{}", n.input, n.output))
        .collect();
    debug!("Filter stages: {}", chain.join(" "));
    args.push("-filter_complex".to_string());
    args.push(graph.to_string());

    args.push("-map".to_string());
    args.push(format!("[{}]", graph.output_label()));
    // 替换音轨固定为 0 号输入；否则取主视频的第一条音轨 (可能不存在)
    args.push("-map".to_string());
    args.push(if plan.audio_track.is_some() {
        "0:a:0".to_string()
    } else {
        "0:a:0?".to_string()
    });

    let enc = &plan.encoder;
    let audio_rate = enc.audio_rate.to_string();
    push_args(
        &mut args,
        [
            "-c:v",
            &enc.video_codec,
            "-preset",
            &enc.preset,
            "-g",
            &enc.gop.to_string(),
            "-b:v",
            &enc.video_bitrate,
            "-maxrate",
            &enc.maxrate,
            "-bufsize",
            &enc.bufsize,
            "-pix_fmt",
            &enc.pix_fmt,
            "-c:a",
            &enc.audio_codec,
            "-b:a",
            &enc.audio_bitrate,
            "-ac",
            &enc.audio_channels.to_string(),
            "-ar",
            &audio_rate,
            "-filter:a",
            &format!("aresample={audio_rate}"),
            "-strict",
            "experimental",
            "-f",
            &enc.format,
        ],
    );
    args.push(plan.destination.clone());

    PipelineSpec {
        program: program.to_string(),
        args,
        destination: plan.destination.clone(),
    }
}
