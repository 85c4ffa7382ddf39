// 基于 ratatui + crossterm 的背单词打字练习 TUI
// 功能：
// - 内置词典目录（可用 data/dicts.json 扩展/覆盖），词表按 URL 后台拉取并缓存
// - 每章固定 20 词：章节切片 + trans 字段兜底归一化 + 渲染顺序编号
// - 复习模式：回放 review.json 错词本，打对即消除；练习中打错自动记入
// - "sentence" 词典第 0 章固定使用内置例句样本（新手引导）

use std::{
    cmp::min,
    collections::HashMap,
    fs, io,
    path::{Path, PathBuf},
    sync::{
        mpsc::{self, Receiver, Sender},
        Arc,
    },
    thread,
    time::Duration,
};

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{ArgAction, Parser, ValueEnum};
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEvent, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use once_cell::sync::Lazy;
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, Wrap},
    Frame, Terminal,
};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use unicode_width::UnicodeWidthStr;

#[derive(Debug, Clone, Parser)]
#[command(name = "wordtk-tui", about = "WordTK 打字练习 TUI 工具", version)]
struct Cli {
    /// 数据目录，默认向上探测 wordTK/data 或环境变量 WORD_TK_DATA
    #[arg(long, short = 'd')]
    data: Option<PathBuf>,

    /// 启动词典 id（如 cet4），默认目录中的第一本
    #[arg(long)]
    dict: Option<String>,

    /// 启动章节（从 0 开始，越界时自动回到第 0 章）
    #[arg(long, default_value_t = 0)]
    chapter: usize,

    /// 启动即进入复习模式（回放错词本）
    #[arg(long, action = ArgAction::SetTrue)]
    review: bool,

    /// 主题（外观）：dark | light
    #[arg(long = "theme", value_enum, default_value_t = ThemeKind::Dark)]
    theme: ThemeKind,
}

// ---------------- 常量 ----------------

/// 每章词数（全局固定，不随词典变化）
const CHAPTER_LENGTH: usize = 20;
/// 保留词典 id：该词典第 0 章使用内置例句样本
const SENTENCE_DICT_ID: &str = "sentence";

// ---------------- 数据结构 ----------------

#[derive(Debug, Clone, Serialize, Deserialize)]
struct DictInfo {
    id: String,
    name: String,
    url: String,
    #[serde(default)]
    word_count: usize,
    #[serde(default)]
    category: String,
    #[serde(default)]
    language: String,
}

impl DictInfo {
    /// 总章数由词数推出，最后一章可能不满
    fn chapter_count(&self) -> usize {
        self.word_count.div_ceil(CHAPTER_LENGTH)
    }
}

/// 词表里的原始词条。trans 来自各路词典源，格式不可信：
/// 可能是字符串数组、单个标量、null，甚至任意对象
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Word {
    name: String,
    #[serde(default)]
    trans: Value,
    #[serde(default)]
    usphone: String,
    #[serde(default)]
    ukphone: String,
}

/// 归一化后的渲染词条：trans 一定是字符串列表，index 按渲染顺序从 0 连续编号
#[derive(Debug, Clone, PartialEq)]
struct WordWithIndex {
    name: String,
    trans: Vec<String>,
    usphone: String,
    ukphone: String,
    index: usize,
}

// ---------------- 词表核心 ----------------

/// trans 字段兜底：
/// - 数组 => 只保留其中的字符串元素（不做类型转换）
/// - null / 对象 => 空列表
/// - 其余标量（数字、布尔等）=> 其字符串表示的单元素列表
fn normalize_trans(raw: &Value) -> Vec<String> {
    match raw {
        Value::Array(items) => items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        Value::Null | Value::Object(_) => Vec::new(),
        Value::String(s) => vec![s.clone()],
        other => vec![other.to_string()],
    }
}

/// 第 chapter 章的切片：[chapter*20, (chapter+1)*20) 与词表范围求交，
/// 越界返回空切片（兜底路径，不算错误）
fn chapter_window(full: &[Word], chapter: usize) -> &[Word] {
    let start = chapter.saturating_mul(CHAPTER_LENGTH);
    if start >= full.len() {
        return &[];
    }
    let end = min(start + CHAPTER_LENGTH, full.len());
    &full[start..end]
}

/// 章节越界自愈：chapter >= chapter_count 时把共享章节格重置为 0。
/// chapter_count == 0 且 chapter == 0 视为在界内，不触发
fn guard_chapter(chapter: &mut usize, chapter_count: usize) -> bool {
    if *chapter >= chapter_count && *chapter != 0 {
        *chapter = 0;
        true
    } else {
        false
    }
}

/// 四路数据源，按优先级取第一个命中的分支：
/// 内置例句样本 > 复习错词 > 已拉取词表的章节切片 > 空（拉取未完成）
fn resolve_source<'a>(
    is_intro: bool,
    review_mode: bool,
    review_words: Option<&'a [Word]>,
    fetched: Option<&'a [Word]>,
    chapter: usize,
) -> &'a [Word] {
    if is_intro {
        FIRST_CHAPTER.as_slice()
    } else if review_mode {
        review_words.unwrap_or(&[])
    } else if let Some(data) = fetched {
        chapter_window(data, chapter)
    } else {
        &[]
    }
}

/// 记录渲染顺序 index，并对 trans 做兜底归一化。纯函数：同一输入必得同一输出
fn tag_words(words: &[Word]) -> Vec<WordWithIndex> {
    words
        .iter()
        .enumerate()
        .map(|(index, w)| WordWithIndex {
            name: w.name.clone(),
            trans: normalize_trans(&w.trans),
            usphone: w.usphone.clone(),
            ukphone: w.ukphone.clone(),
            index,
        })
        .collect()
}

/// 装配结果：words 供渲染层直接消费，isLoading/error 原样透传拉取状态
#[derive(Debug, Clone, Default)]
struct WordList {
    words: Arc<Vec<WordWithIndex>>,
    is_loading: bool,
    error: Option<String>,
}

/// 装配依赖的快照。任何一项变化才重算 words，
/// 否则复用上一次的 Arc（渲染层依赖它的引用稳定性）
#[derive(Debug, Clone, PartialEq)]
struct WordListKey {
    dict_id: String,
    url: String,
    chapter: usize,
    review_mode: bool,
    review_rev: u64,
    data_ptr: usize,
}

#[derive(Debug, Default)]
struct WordListMemo {
    key: Option<WordListKey>,
    words: Arc<Vec<WordWithIndex>>,
}

/// 词表装配：先跑章节自愈（本轮立即使用纠正后的下标），再选源、切片、归一化、编号。
/// 章节格由调用方显式传入，避免进程级单例
#[allow(clippy::too_many_arguments)]
fn assemble_word_list(
    memo: &mut WordListMemo,
    dict: &DictInfo,
    chapter: &mut usize,
    review_mode: bool,
    review_words: Option<&[Word]>,
    review_rev: u64,
    fetched: Option<&Arc<Vec<Word>>>,
    is_loading: bool,
    error: Option<&str>,
) -> WordList {
    guard_chapter(chapter, dict.chapter_count());

    let key = WordListKey {
        dict_id: dict.id.clone(),
        url: dict.url.clone(),
        chapter: *chapter,
        review_mode,
        review_rev,
        data_ptr: fetched.map(|d| Arc::as_ptr(d) as usize).unwrap_or(0),
    };
    if memo.key.as_ref() != Some(&key) {
        let is_intro = !review_mode && dict.id == SENTENCE_DICT_ID && *chapter == 0;
        let raw = resolve_source(
            is_intro,
            review_mode,
            review_words,
            fetched.map(|d| d.as_slice()),
            *chapter,
        );
        memo.words = Arc::new(tag_words(raw));
        memo.key = Some(key);
    }

    WordList {
        words: Arc::clone(&memo.words),
        is_loading,
        error: error.map(str::to_string),
    }
}

// ---------------- 内置例句样本 ----------------

fn sentence_word(name: &str, trans: &str) -> Word {
    Word {
        name: name.to_string(),
        trans: Value::Array(vec![Value::String(trans.to_string())]),
        usphone: String::new(),
        ukphone: String::new(),
    }
}

/// "sentence" 词典第 0 章的固定内容，随版本内置，不参与拉取与切片
static FIRST_CHAPTER: Lazy<Vec<Word>> = Lazy::new(|| {
    vec![
        sentence_word(
            "The celebrated theory is still the source of great controversy.",
            "这一著名的理论至今仍是巨大争议的根源。",
        ),
        sentence_word(
            "A good architectural structure should be useful, durable and beautiful.",
            "一个好的建筑结构应该实用、耐用、美观。",
        ),
        sentence_word(
            "A group meeting will be held tomorrow in the library conference room.",
            "明天将在图书馆会议室举行小组会议。",
        ),
        sentence_word(
            "A number of students have volunteer jobs.",
            "许多学生从事志愿工作。",
        ),
        sentence_word(
            "We can all meet at my office after the lecture.",
            "讲座结束后我们可以在我的办公室见面。",
        ),
        sentence_word(
            "Tutorials are scheduled in the final week of the term.",
            "辅导课安排在学期的最后一周。",
        ),
        sentence_word(
            "You can make an appointment to meet the librarian.",
            "你可以和图书管理员约个时间。",
        ),
        sentence_word(
            "Affordable housing is an important issue for all members of society.",
            "经济适用房对社会所有成员来说都是一个重要问题。",
        ),
        sentence_word(
            "Agenda items should be submitted by the end of the day.",
            "议程项目应在当天结束前提交。",
        ),
        sentence_word(
            "All dissertations must be accompanied by a submission form.",
            "所有论文必须附上提交表格。",
        ),
        sentence_word(
            "All industries are a system of inputs, processes, outputs and feedback.",
            "所有行业都是一个输入、处理、输出和反馈的系统。",
        ),
        sentence_word(
            "All of the assignments must be submitted in person to the faculty office.",
            "所有作业必须亲自提交到学院办公室 / 教职员工办公室。",
        ),
        sentence_word(
            "Economic development needs to be supported by the government.",
            "经济发展需要政府的支持。",
        ),
        sentence_word(
            "All of your assignments are due by tomorrow.",
            "你明天应该交所有的作业。",
        ),
        sentence_word(
            "The toughest part of postgraduate education is funding.",
            "研究生教育最困难的部分是资金。",
        ),
        sentence_word(
            "Our view is that educational reforms have been inadequately implemented.",
            "我们的看法是，教育改革执行得不够充分。",
        ),
        sentence_word(
            "Although sustainable development is not easy, it is an unavoidable responsibility.",
            "可持续发展虽然不容易，但是一项不可推卸的责任。",
        ),
        sentence_word(
            "Americans have typically defined the process of plant growth in quantitative terms.",
            "美国人通常用定量术语来定义植物生长的过程。",
        ),
        sentence_word(
            "An introduction is an essential element of presentation.",
            "简介是演讲的基本要素。",
        ),
        sentence_word(
            "The assignments should be submitted to the department office before the deadlines.",
            "作业须于截止日期前送交系办公室。",
        ),
    ]
});

// ---------------- 词典目录 ----------------

fn builtin_dict(id: &str, name: &str, url: &str, word_count: usize, category: &str) -> DictInfo {
    DictInfo {
        id: id.to_string(),
        name: name.to_string(),
        url: url.to_string(),
        word_count,
        category: category.to_string(),
        language: "en".to_string(),
    }
}

static BUILTIN_DICTS: Lazy<Vec<DictInfo>> = Lazy::new(|| {
    vec![
        builtin_dict("sentence", "例句练习", "dicts/sentence.json", 600, "句子"),
        builtin_dict("cet4", "CET-4", "dicts/cet4.json", 2607, "英语考试"),
        builtin_dict("cet6", "CET-6", "dicts/cet6.json", 2345, "英语考试"),
        builtin_dict("kaoyan", "考研词汇", "dicts/kaoyan.json", 3728, "英语考试"),
        builtin_dict("toefl", "TOEFL", "dicts/toefl.json", 4264, "留学"),
        builtin_dict("gre", "GRE", "dicts/gre.json", 6515, "留学"),
        builtin_dict("coder", "Coder Dict", "dicts/coder.json", 599, "代码"),
    ]
});

/// 目录 = 内置词典 + data/dicts.json 的扩展（同 id 覆盖，新 id 追加）
fn load_dict_catalog(data_dir: &Path) -> Result<Vec<DictInfo>> {
    let mut dicts = BUILTIN_DICTS.clone();
    let path = data_dir.join("dicts.json");
    if path.exists() {
        let s = fs::read_to_string(&path)
            .with_context(|| format!("读取词典目录失败: {}", path.display()))?;
        let extra: Vec<DictInfo> = serde_json::from_str(&s).context("解析 dicts.json 失败")?;
        for d in extra {
            if let Some(slot) = dicts.iter_mut().find(|x| x.id == d.id) {
                *slot = d;
            } else {
                dicts.push(d);
            }
        }
    }
    Ok(dicts)
}

fn default_data_dir(cli: &Cli) -> PathBuf {
    if let Some(p) = &cli.data {
        return p.clone();
    }
    if let Ok(envp) = std::env::var("WORD_TK_DATA") {
        return PathBuf::from(envp);
    }

    // 自动探测：从当前目录向上查找常见路径
    let mut candidates: Vec<PathBuf> = Vec::new();
    if let Ok(cwd) = std::env::current_dir() {
        for anc in cwd.ancestors() {
            candidates.push(anc.join("wordTK/data"));
            candidates.push(anc.join("data"));
        }
    }
    for c in candidates {
        if c.exists() {
            return c;
        }
    }
    // 最后返回默认路径（词表拉取失败时会给出清晰错误）
    PathBuf::from("data")
}

// ---------------- 后台拉取与缓存 ----------------

/// 以 URL 为键的词表缓存。Pending 表示已有线程在拉，重复请求直接去重；
/// 结果按 URL 落槽，切换词典后迟到的旧结果不会覆盖新词典的条目
#[derive(Debug, Clone)]
enum FetchState {
    Pending,
    Ready(Arc<Vec<Word>>),
    Failed(String),
}

#[derive(Debug)]
struct WordListFetcher {
    cache: HashMap<String, FetchState>,
    tx: Sender<(String, Result<Vec<Word>, String>)>,
    rx: Receiver<(String, Result<Vec<Word>, String>)>,
    data_dir: PathBuf,
}

impl WordListFetcher {
    fn new(data_dir: PathBuf) -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            cache: HashMap::new(),
            tx,
            rx,
            data_dir,
        }
    }

    /// 发起一次拉取。同一 URL 已有任何状态（拉取中/已完成/已失败）都不再发起
    fn request(&mut self, url: &str) {
        if self.cache.contains_key(url) {
            return;
        }
        self.cache.insert(url.to_string(), FetchState::Pending);
        let tx = self.tx.clone();
        let url = url.to_string();
        let data_dir = self.data_dir.clone();
        thread::spawn(move || {
            let res = fetch_word_list(&url, &data_dir);
            let _ = tx.send((url, res));
        });
    }

    /// 事件循环每帧调用：收下工作线程的结果，升级对应的 Pending 槽位
    fn poll(&mut self) -> bool {
        let mut changed = false;
        while let Ok((url, res)) = self.rx.try_recv() {
            let entry = self.cache.entry(url).or_insert(FetchState::Pending);
            if matches!(entry, FetchState::Pending) {
                *entry = match res {
                    Ok(words) => FetchState::Ready(Arc::new(words)),
                    Err(e) => FetchState::Failed(e),
                };
                changed = true;
            }
        }
        changed
    }

    fn get(&self, url: &str) -> Option<&FetchState> {
        self.cache.get(url)
    }

    fn clear(&mut self) {
        self.cache.clear();
    }
}

/// 工作线程里执行的实际拉取：http(s) 走网络，其余当作数据目录下的文件路径。
/// 错误在这里统一格式化成字符串，跨线程带回
fn fetch_word_list(url: &str, data_dir: &Path) -> Result<Vec<Word>, String> {
    if url.starts_with("http://") || url.starts_with("https://") {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(15))
            .user_agent("wordtk-tui")
            .build()
            .map_err(|e| e.to_string())?;
        client
            .get(url)
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(|e| format!("拉取词表失败: {e}"))?
            .json::<Vec<Word>>()
            .map_err(|e| format!("解析词表失败: {url}: {e}"))
    } else {
        let path = if Path::new(url).is_absolute() {
            PathBuf::from(url)
        } else {
            data_dir.join(url)
        };
        let s = fs::read_to_string(&path)
            .map_err(|e| format!("读取词表失败: {}: {e}", path.display()))?;
        serde_json::from_str(&s).map_err(|e| format!("解析词表失败: {}: {e}", path.display()))
    }
}

// ---------------- 错词本存储 ----------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ReviewEntry {
    #[serde(flatten)]
    word: Word,
    #[serde(default)]
    dict_id: String,
    #[serde(default)]
    missed_at: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ReviewFile {
    #[serde(default)]
    words: Vec<ReviewEntry>,
}

#[derive(Debug)]
struct ReviewStore {
    path: PathBuf,
    data: ReviewFile,
    // 物化的词列表，装配方直接借用；rev 随每次变更递增，供变更检测用
    cache: Vec<Word>,
    rev: u64,
    dirty: bool,
}

impl ReviewStore {
    fn open(path: PathBuf) -> Result<Self> {
        let data: ReviewFile = if path.exists() {
            let s = fs::read_to_string(&path)
                .with_context(|| format!("读取错词本失败: {}", path.display()))?;
            serde_json::from_str(&s).unwrap_or_default()
        } else {
            ReviewFile::default()
        };
        let cache = data.words.iter().map(|e| e.word.clone()).collect();
        Ok(Self {
            path,
            data,
            cache,
            rev: 0,
            dirty: false,
        })
    }

    fn save(&mut self) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)?;
        }
        let s = serde_json::to_string_pretty(&self.data)?;
        fs::write(&self.path, s)
            .with_context(|| format!("写入错词本失败: {}", self.path.display()))?;
        self.dirty = false;
        Ok(())
    }

    /// 记一个错词。同名词条只留最新一条
    fn record_miss(&mut self, word: Word, dict_id: &str) {
        self.data.words.retain(|e| e.word.name != word.name);
        self.data.words.push(ReviewEntry {
            word,
            dict_id: dict_id.to_string(),
            missed_at: Utc::now().to_rfc3339(),
        });
        self.rebuild();
    }

    /// 复习时打对即消除
    fn remove(&mut self, name: &str) {
        let before = self.data.words.len();
        self.data.words.retain(|e| e.word.name != name);
        if self.data.words.len() != before {
            self.rebuild();
        }
    }

    fn rebuild(&mut self) {
        self.cache = self.data.words.iter().map(|e| e.word.clone()).collect();
        self.rev += 1;
        self.dirty = true;
    }

    fn words(&self) -> &[Word] {
        &self.cache
    }

    fn rev(&self) -> u64 {
        self.rev
    }
}

// ---------------- 会话状态 ----------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Focus {
    Picker,
    Typing,
}

#[derive(Debug, Default)]
struct TypingState {
    pos: usize,    // 当前词在本章中的下标
    input: String, // 已敲入的前缀（一出错即清空，始终是目标词的合法前缀）
    correct: usize,
    wrong: usize,
    wrong_marked: bool, // 当前词是否已记过错，避免重复入错词本
}

#[derive(Debug)]
struct App {
    dicts: Vec<DictInfo>,
    dict_idx: usize,
    current_chapter: usize, // 共享章节格：会话级可变状态，装配时传 &mut
    review_mode: bool,
    review: ReviewStore,
    fetcher: WordListFetcher,
    memo: WordListMemo,
    word_list: WordList,
    typing: TypingState,
    focus: Focus,
    list_state: ListState,
    search_query: Option<String>,
    search_active: bool,
    filtered: Vec<usize>,
    theme: Theme,
    keymap: HashMap<char, KeyAction>,
    status: Option<String>,
    show_help: bool,
    data_dir: PathBuf,
}

impl App {
    #[allow(clippy::too_many_arguments)]
    fn new(
        dicts: Vec<DictInfo>,
        data_dir: PathBuf,
        review: ReviewStore,
        dict_idx: usize,
        chapter: usize,
        review_mode: bool,
        theme: Theme,
        keymap: HashMap<char, KeyAction>,
    ) -> Self {
        let fetcher = WordListFetcher::new(data_dir.clone());
        let mut app = Self {
            dicts,
            dict_idx,
            current_chapter: chapter,
            review_mode,
            review,
            fetcher,
            memo: WordListMemo::default(),
            word_list: WordList::default(),
            typing: TypingState::default(),
            focus: Focus::Typing,
            list_state: ListState::default(),
            search_query: None,
            search_active: false,
            filtered: vec![],
            theme,
            keymap,
            status: None,
            show_help: false,
            data_dir,
        };
        refresh_dict_filter(&mut app);
        app.list_state.select(Some(app.dict_idx));
        app
    }

    fn current_dict(&self) -> &DictInfo {
        &self.dicts[self.dict_idx]
    }
}

/// 每帧重算一次派生词表。装配内部有依赖快照，依赖没变时只是复用旧 Arc，开销可忽略
fn refresh_word_list(app: &mut App) {
    let dict = app.dicts[app.dict_idx].clone();
    app.fetcher.request(&dict.url);
    let (fetched, is_loading, error) = match app.fetcher.get(&dict.url) {
        Some(FetchState::Ready(data)) => (Some(Arc::clone(data)), false, None),
        Some(FetchState::Failed(e)) => (None, false, Some(e.clone())),
        _ => (None, true, None),
    };
    app.word_list = assemble_word_list(
        &mut app.memo,
        &dict,
        &mut app.current_chapter,
        app.review_mode,
        Some(app.review.words()),
        app.review.rev(),
        fetched.as_ref(),
        is_loading,
        error.as_deref(),
    );

    // 列表收缩（复习消词等）后下标回绕
    let n = app.word_list.words.len();
    if n == 0 {
        app.typing.pos = 0;
        app.typing.input.clear();
    } else if app.typing.pos >= n {
        app.typing.pos = 0;
        app.typing.input.clear();
        app.typing.wrong_marked = false;
    }
}

fn reset_typing(app: &mut App) {
    app.typing = TypingState::default();
}

fn on_typing_char(app: &mut App, c: char) {
    let words = Arc::clone(&app.word_list.words);
    let Some(w) = words.get(app.typing.pos).cloned() else {
        return;
    };
    app.typing.input.push(c);
    let input_chars = app.typing.input.chars().count();
    let name_chars: Vec<char> = w.name.chars().collect();
    let is_prefix = name_chars
        .iter()
        .take(input_chars)
        .copied()
        .eq(app.typing.input.chars());

    if !is_prefix {
        // 打错：计数、清空重来；普通练习里首次出错记入错词本
        app.typing.wrong += 1;
        app.typing.input.clear();
        if !app.typing.wrong_marked {
            app.typing.wrong_marked = true;
            if !app.review_mode {
                let raw = Word {
                    name: w.name.clone(),
                    trans: Value::Array(w.trans.iter().cloned().map(Value::String).collect()),
                    usphone: w.usphone.clone(),
                    ukphone: w.ukphone.clone(),
                };
                let dict_id = app.current_dict().id.clone();
                app.review.record_miss(raw, &dict_id);
            }
        }
        app.status = Some("✗ 输入错误，重新输入".into());
        return;
    }

    if input_chars == name_chars.len() {
        app.typing.correct += 1;
        app.typing.input.clear();
        app.typing.wrong_marked = false;
        if app.review_mode {
            // 消除后列表收缩，同一下标顺延到下一词；越界由 refresh 回绕
            app.review.remove(&w.name);
            app.status = Some("✓ 已从错词本消除".into());
        } else {
            app.typing.pos += 1;
            if app.typing.pos >= words.len() {
                app.typing.pos = 0;
                app.status = Some("本章完成 🎉".into());
            }
        }
    }
}

fn skip_word(app: &mut App, delta: isize) {
    let n = app.word_list.words.len();
    if n == 0 {
        return;
    }
    let pos = app.typing.pos as isize + delta;
    app.typing.pos = pos.rem_euclid(n as isize) as usize;
    app.typing.input.clear();
    app.typing.wrong_marked = false;
}

fn move_selection(app: &mut App, delta: isize) {
    let n = app.filtered.len();
    if n == 0 {
        return;
    }
    let cur = app.list_state.selected().unwrap_or(0) as isize;
    let next = (cur + delta).clamp(0, n as isize - 1) as usize;
    app.list_state.select(Some(next));
}

fn select_dict(app: &mut App) {
    if let Some(sel) = app.list_state.selected() {
        if let Some(&idx) = app.filtered.get(sel) {
            app.dict_idx = idx;
            app.current_chapter = 0;
            app.review_mode = false;
            reset_typing(app);
            app.focus = Focus::Typing;
            app.status = Some(format!("已切换词典: {}", app.dicts[idx].name));
        }
    }
}

fn toggle_review(app: &mut App) {
    app.review_mode = !app.review_mode;
    reset_typing(app);
    app.status = Some(if app.review_mode {
        format!("复习模式: 错词本共 {} 词", app.review.words().len())
    } else {
        "退出复习模式".into()
    });
}

fn prev_chapter(app: &mut App) {
    if app.review_mode {
        app.status = Some("复习模式下无章节".into());
        return;
    }
    if app.current_chapter > 0 {
        app.current_chapter -= 1;
        reset_typing(app);
    } else {
        app.status = Some("已是第一章".into());
    }
}

fn next_chapter(app: &mut App) {
    if app.review_mode {
        app.status = Some("复习模式下无章节".into());
        return;
    }
    let count = app.current_dict().chapter_count();
    if app.current_chapter + 1 < count {
        app.current_chapter += 1;
        reset_typing(app);
    } else {
        app.status = Some("已是最后一章".into());
    }
}

fn reload(app: &mut App) -> Result<()> {
    app.dicts = load_dict_catalog(&app.data_dir)?;
    if app.dict_idx >= app.dicts.len() {
        app.dict_idx = 0;
    }
    app.fetcher.clear();
    refresh_dict_filter(app);
    reset_typing(app);
    app.status = Some("已重载词典目录".into());
    Ok(())
}

/// 词典搜索：按正则（大小写不敏感）匹配 name/id/category，
/// 正则非法时退化为小写包含匹配
fn refresh_dict_filter(app: &mut App) {
    let q = app.search_query.clone().unwrap_or_default();
    if q.is_empty() {
        app.filtered = (0..app.dicts.len()).collect();
    } else {
        let re = Regex::new(&format!("(?i){q}")).ok();
        let ql = q.to_lowercase();
        app.filtered = app
            .dicts
            .iter()
            .enumerate()
            .filter(|(_, d)| match &re {
                Some(re) => re.is_match(&d.name) || re.is_match(&d.id) || re.is_match(&d.category),
                None => d.name.to_lowercase().contains(&ql) || d.id.to_lowercase().contains(&ql),
            })
            .map(|(i, _)| i)
            .collect();
    }
    if app.filtered.is_empty() {
        app.list_state.select(None);
    } else if app
        .list_state
        .selected()
        .map_or(true, |s| s >= app.filtered.len())
    {
        app.list_state.select(Some(0));
    }
}

// ---------------- 入口与事件循环 ----------------

fn main() -> Result<()> {
    let cli = Cli::parse();
    let data_dir = default_data_dir(&cli);
    let dicts = load_dict_catalog(&data_dir)?;
    let keymap = load_keymap(&data_dir).unwrap_or_else(|_| default_keymap());
    let review = ReviewStore::open(data_dir.join("review.json"))?;

    let dict_idx = cli
        .dict
        .as_deref()
        .and_then(|want| dicts.iter().position(|d| d.id == want))
        .unwrap_or(0);

    // TUI 初始化
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut app = App::new(
        dicts,
        data_dir,
        review,
        dict_idx,
        cli.chapter,
        cli.review,
        theme_of(cli.theme),
        keymap,
    );
    let res = run_app(&mut terminal, &mut app);

    // 退出还原
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    // 本次会话新增的错词落盘
    if app.review.dirty {
        app.review.save()?;
    }
    res
}

fn run_app<B: ratatui::backend::Backend>(terminal: &mut Terminal<B>, app: &mut App) -> Result<()> {
    loop {
        app.fetcher.poll();
        refresh_word_list(app);
        terminal.draw(|f| ui(f, app))?;
        if event::poll(Duration::from_millis(200))? {
            match event::read()? {
                Event::Key(k) => {
                    if handle_key(app, k)? {
                        break;
                    }
                }
                _ => {}
            }
        }
    }
    Ok(())
}

fn handle_key(app: &mut App, key: KeyEvent) -> Result<bool> {
    if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
        return Ok(true);
    }
    if app.show_help {
        app.show_help = false;
        return Ok(false);
    }
    // 搜索输入优先
    if app.search_active {
        match key.code {
            KeyCode::Esc => {
                app.search_active = false;
                app.search_query = None;
                refresh_dict_filter(app);
            }
            KeyCode::Enter => {
                app.search_active = false;
            }
            KeyCode::Backspace => {
                if let Some(q) = app.search_query.as_mut() {
                    q.pop();
                }
                refresh_dict_filter(app);
            }
            KeyCode::Char(c) => {
                app.search_query.get_or_insert_with(String::new).push(c);
                refresh_dict_filter(app);
            }
            _ => {}
        }
        return Ok(false);
    }

    match key.code {
        KeyCode::Tab => {
            app.focus = match app.focus {
                Focus::Picker => Focus::Typing,
                Focus::Typing => Focus::Picker,
            };
        }
        KeyCode::Esc => match app.focus {
            Focus::Typing => {
                if app.typing.input.is_empty() {
                    app.focus = Focus::Picker;
                } else {
                    app.typing.input.clear();
                }
            }
            Focus::Picker => {
                app.search_query = None;
                refresh_dict_filter(app);
            }
        },
        KeyCode::Enter => {
            if app.focus == Focus::Picker {
                select_dict(app);
            }
        }
        KeyCode::Backspace => {
            if app.focus == Focus::Typing {
                app.typing.input.pop();
            }
        }
        KeyCode::Left => {
            if app.focus == Focus::Typing {
                skip_word(app, -1);
            }
        }
        KeyCode::Right => {
            if app.focus == Focus::Typing {
                skip_word(app, 1);
            }
        }
        KeyCode::Down => {
            if app.focus == Focus::Picker {
                move_selection(app, 1);
            }
        }
        KeyCode::Up => {
            if app.focus == Focus::Picker {
                move_selection(app, -1);
            }
        }
        KeyCode::Char(c) => match app.focus {
            Focus::Typing => on_typing_char(app, c),
            Focus::Picker => {
                if let Some(&action) = app.keymap.get(&c) {
                    return apply_action(app, action);
                }
            }
        },
        _ => {}
    }
    Ok(false)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyAction {
    Quit,
    MoveUp,
    MoveDown,
    Select,
    FocusTyping,
    ToggleReview,
    PrevChapter,
    NextChapter,
    FirstChapter,
    Search,
    Reload,
    SaveReview,
    Help,
}

fn apply_action(app: &mut App, action: KeyAction) -> Result<bool> {
    use KeyAction::*;
    match action {
        Quit => return Ok(true),
        MoveDown => move_selection(app, 1),
        MoveUp => move_selection(app, -1),
        Select => select_dict(app),
        FocusTyping => app.focus = Focus::Typing,
        ToggleReview => toggle_review(app),
        PrevChapter => prev_chapter(app),
        NextChapter => next_chapter(app),
        FirstChapter => {
            if !app.review_mode && app.current_chapter != 0 {
                app.current_chapter = 0;
                reset_typing(app);
            }
        }
        Search => {
            app.search_active = true;
            app.search_query = Some(String::new());
            refresh_dict_filter(app);
        }
        Reload => reload(app)?,
        SaveReview => {
            app.review.save()?;
            app.status = Some("错词本已保存".into());
        }
        Help => app.show_help = true,
    }
    Ok(false)
}

// ---------------- Keymap ----------------

#[derive(Deserialize)]
struct KeyMapToml {
    keys: HashMap<String, String>,
}

fn load_keymap(data_dir: &Path) -> Result<HashMap<char, KeyAction>> {
    // 探测 keymap.toml：当前目录、数据目录及向上
    let mut paths = vec![PathBuf::from("keymap.toml"), data_dir.join("keymap.toml")];
    if let Ok(cwd) = std::env::current_dir() {
        for anc in cwd.ancestors() {
            paths.push(anc.join("wordTK/keymap.toml"));
        }
    }
    for p in paths {
        if p.exists() {
            let content = fs::read_to_string(&p)
                .with_context(|| format!("读取 keymap 失败: {}", p.display()))?;
            let km: KeyMapToml = toml::from_str(&content).context("解析 keymap.toml 失败")?;
            return Ok(parse_keymap(km.keys));
        }
    }
    Err(anyhow::anyhow!("未找到 keymap.toml"))
}

fn parse_keymap(map: HashMap<String, String>) -> HashMap<char, KeyAction> {
    let mut out = HashMap::new();
    for (k, v) in map {
        if let Some(ch) = k.chars().next() {
            if k.chars().count() == 1 {
                if let Some(act) = action_from_str(&v) {
                    out.insert(ch, act);
                }
            }
        }
    }
    if out.is_empty() {
        out = default_keymap();
    }
    out
}

fn action_from_str(s: &str) -> Option<KeyAction> {
    use KeyAction::*;
    Some(match s {
        "quit" => Quit,
        "move_up" => MoveUp,
        "move_down" => MoveDown,
        "select" => Select,
        "focus_typing" => FocusTyping,
        "toggle_review" => ToggleReview,
        "prev_chapter" => PrevChapter,
        "next_chapter" => NextChapter,
        "first_chapter" => FirstChapter,
        "search" => Search,
        "reload" => Reload,
        "save_review" => SaveReview,
        "help" => Help,
        _ => return None,
    })
}

fn default_keymap() -> HashMap<char, KeyAction> {
    use KeyAction::*;
    let mut m = HashMap::new();
    m.insert('q', Quit);
    m.insert('k', MoveUp);
    m.insert('j', MoveDown);
    m.insert('l', Select);
    m.insert('i', FocusTyping);
    m.insert('r', ToggleReview);
    m.insert('[', PrevChapter);
    m.insert(']', NextChapter);
    m.insert('g', FirstChapter);
    m.insert('/', Search);
    m.insert('R', Reload); // 大写 R
    m.insert('s', SaveReview);
    m.insert('?', Help);
    m
}

// ---------------- 界面绘制 ----------------

fn ui(f: &mut Frame, app: &mut App) {
    // 顶栏 + 主区 + 底栏
    let v = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Min(5),
            Constraint::Length(1),
        ])
        .split(f.area());

    // 主区再水平分栏：左词典列表 / 右打字面板
    let h = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(32), Constraint::Percentage(68)])
        .split(v[1]);

    draw_header(f, v[0], app);
    draw_dict_list(f, h[0], app);
    draw_typing(f, h[1], app);
    draw_footer(f, v[2], app);
    if app.show_help {
        draw_help(f, app);
    }
}

fn draw_header(f: &mut Frame, area: Rect, app: &App) {
    let th = app.theme;
    // 背景色条
    let bg = Block::default()
        .borders(Borders::NONE)
        .style(Style::default().bg(th.bar_bg));
    f.render_widget(bg, area);

    let dict = app.current_dict();
    let mut segs = vec![
        Span::styled(
            " WordTK · Typing ",
            Style::default().fg(th.accent).add_modifier(Modifier::BOLD),
        ),
        Span::styled(" | 词典:", Style::default().fg(th.muted)),
        Span::styled(dict.name.clone(), Style::default().fg(th.fg)),
    ];
    if app.review_mode {
        segs.push(Span::styled(
            format!(" [复习 {} 词]", app.review.words().len()),
            Style::default().fg(th.warn).add_modifier(Modifier::BOLD),
        ));
    } else {
        segs.push(Span::styled(" | 章节:", Style::default().fg(th.muted)));
        segs.push(Span::styled(
            format!(
                "{}/{}",
                app.current_chapter + 1,
                dict.chapter_count().max(1)
            ),
            Style::default().fg(th.fg),
        ));
    }
    segs.push(Span::styled(" | 正:", Style::default().fg(th.muted)));
    segs.push(Span::styled(
        format!("{}", app.typing.correct),
        Style::default().fg(th.good),
    ));
    segs.push(Span::styled(" 误:", Style::default().fg(th.muted)));
    segs.push(Span::styled(
        format!("{}", app.typing.wrong),
        Style::default().fg(th.bad),
    ));
    if app.word_list.is_loading {
        segs.push(Span::styled(" | 拉取中…", Style::default().fg(th.info)));
    }
    if app.word_list.error.is_some() {
        segs.push(Span::styled(" | ✖ 拉取失败", Style::default().fg(th.bad)));
    }
    if app.search_active {
        let q = app.search_query.as_deref().unwrap_or("");
        segs.push(Span::styled("  /", Style::default().fg(th.muted)));
        segs.push(Span::styled(q.to_string(), Style::default().fg(th.fg)));
        segs.push(Span::styled("_", Style::default().fg(th.accent)));
    }
    if let Some(s) = &app.status {
        segs.push(Span::styled("  ", Style::default()));
        segs.push(Span::styled(s.clone(), Style::default().fg(th.warn)));
    }
    let para = Paragraph::new(Line::from(segs)).style(Style::default().bg(th.bar_bg).fg(th.fg));
    f.render_widget(para, area);
}

fn draw_dict_list(f: &mut Frame, area: Rect, app: &mut App) {
    let th = app.theme;
    let items: Vec<ListItem> = app
        .filtered
        .iter()
        .filter_map(|&idx| app.dicts.get(idx).map(|d| (idx, d)))
        .map(|(idx, d)| {
            let active = idx == app.dict_idx;
            let mut spans = Vec::new();
            spans.push(Span::styled("› ", Style::default().fg(th.accent)));
            spans.push(Span::styled(
                d.name.clone(),
                if active {
                    Style::default().fg(th.accent).add_modifier(Modifier::BOLD)
                } else {
                    Style::default().fg(th.fg)
                },
            ));
            if active {
                spans.push(Span::styled(" ●", Style::default().fg(th.good)));
            }
            spans.push(Span::styled(
                format!("  {}词/{}章", d.word_count, d.chapter_count()),
                Style::default().fg(th.muted),
            ));
            spans.push(Span::styled(
                format!("  {}", d.category),
                Style::default().fg(th.info),
            ));
            ListItem::new(Line::from(spans))
        })
        .collect();

    let focused = app.focus == Focus::Picker;
    let list = List::new(items)
        .block(
            Block::default()
                .title(Span::styled(
                    " 词典列表 (/搜索 Enter选择) ",
                    Style::default().fg(if focused { th.accent } else { th.muted }),
                ))
                .borders(Borders::ALL)
                .border_style(Style::default().fg(if focused { th.accent } else { th.muted })),
        )
        .highlight_style(
            Style::default()
                .bg(th.selection_bg)
                .fg(th.fg)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("▸ ");
    f.render_stateful_widget(list, area, &mut app.list_state);
}

fn draw_typing(f: &mut Frame, area: Rect, app: &App) {
    let th = app.theme;
    let focused = app.focus == Focus::Typing;
    let title = if app.review_mode {
        " 复习模式 · 错词回放 "
    } else {
        " 打字练习 "
    };
    let block = Block::default()
        .title(Span::styled(
            title,
            Style::default().fg(if app.review_mode {
                th.warn
            } else if focused {
                th.accent
            } else {
                th.muted
            }),
        ))
        .borders(Borders::ALL)
        .border_style(Style::default().fg(if focused { th.accent } else { th.muted }));
    let inner_width = area.width.saturating_sub(2) as usize;

    let mut lines: Vec<Line> = Vec::new();
    let words = &app.word_list.words;

    if let Some(err) = &app.word_list.error {
        lines.push(Line::from(Span::styled(
            format!("✖ {err}"),
            Style::default().fg(th.bad),
        )));
        lines.push(Line::from(Span::styled(
            "检查词典 URL 或数据目录后按 R 重载",
            Style::default().fg(th.muted),
        )));
    }
    if words.is_empty() {
        if app.word_list.error.is_none() {
            let hint = if app.word_list.is_loading {
                "词表拉取中…"
            } else if app.review_mode {
                "错词本为空，先去练习里攒一点吧"
            } else {
                "本章没有词条"
            };
            lines.push(Line::from(Span::styled(
                hint,
                Style::default().fg(th.muted),
            )));
        }
        let para = Paragraph::new(lines).block(block).wrap(Wrap { trim: false });
        f.render_widget(para, area);
        return;
    }

    let w = &words[min(app.typing.pos, words.len() - 1)];
    lines.push(Line::from(Span::styled(
        format!("第 {}/{} 词", app.typing.pos + 1, words.len()),
        Style::default().fg(th.muted),
    )));
    lines.push(Line::from(Span::raw("")));

    // 当前词：已敲前缀绿色 + 光标 + 余下部分，整行按显示宽度居中
    let typed_chars = app.typing.input.chars().count();
    let name_chars: Vec<char> = w.name.chars().collect();
    let typed: String = name_chars.iter().take(typed_chars).collect();
    let rest: String = name_chars.iter().skip(typed_chars).collect();
    let word_width = UnicodeWidthStr::width(w.name.as_str()) + 1;
    let pad = if word_width < inner_width {
        (inner_width - word_width) / 2
    } else {
        0
    };
    lines.push(Line::from(vec![
        Span::raw(" ".repeat(pad)),
        Span::styled(
            typed,
            Style::default().fg(th.good).add_modifier(Modifier::BOLD),
        ),
        Span::styled("▏", Style::default().fg(th.accent)),
        Span::styled(rest, Style::default().fg(th.fg)),
    ]));

    if !w.usphone.is_empty() || !w.ukphone.is_empty() {
        let mut phon = String::new();
        if !w.usphone.is_empty() {
            phon.push_str(&format!("US /{}/  ", w.usphone));
        }
        if !w.ukphone.is_empty() {
            phon.push_str(&format!("UK /{}/", w.ukphone));
        }
        let pw = UnicodeWidthStr::width(phon.as_str());
        let ppad = if pw < inner_width {
            (inner_width - pw) / 2
        } else {
            0
        };
        lines.push(Line::from(vec![
            Span::raw(" ".repeat(ppad)),
            Span::styled(phon, Style::default().fg(th.muted)),
        ]));
    }

    lines.push(Line::from(Span::raw("")));
    for t in &w.trans {
        lines.push(Line::from(Span::styled(
            t.clone(),
            Style::default().fg(th.info),
        )));
    }

    let para = Paragraph::new(lines).block(block).wrap(Wrap { trim: false });
    f.render_widget(para, area);
}

fn draw_footer(f: &mut Frame, area: Rect, app: &App) {
    let th = app.theme;
    let bg = Block::default()
        .borders(Borders::NONE)
        .style(Style::default().bg(th.bar_bg));
    f.render_widget(bg, area);
    let tips = match app.focus {
        Focus::Picker => {
            " [q]退出  [j/k]上下  [Enter]选择  [/]搜索  [r]复习  [[/]]章节  [g]第一章  [R]重载  [s]存错词本  [?]帮助  [Tab]切换面板 "
        }
        Focus::Typing => " 直接输入跟打  [Backspace]删除  [←/→]跳词  [Esc]返回列表  [Tab]切换面板 ",
    };
    let help = Paragraph::new(Line::from(vec![Span::styled(
        tips,
        Style::default().fg(th.muted),
    )]))
    .style(Style::default().bg(th.bar_bg));
    f.render_widget(help, area);
}

fn draw_help(f: &mut Frame, app: &App) {
    let th = app.theme;
    let area = centered_rect(56, 60, f.area());
    f.render_widget(Clear, area);
    let block = Block::default()
        .title(Span::styled(" 按键说明 ", Style::default().fg(th.accent)))
        .borders(Borders::ALL)
        .border_style(Style::default().fg(th.muted));
    let rows = [
        ("q / Ctrl+C", "退出（自动保存错词本）"),
        ("Tab", "在词典列表与打字面板间切换"),
        ("j / k / Enter", "列表导航与选择词典"),
        ("/", "搜索词典（支持正则）"),
        ("r", "进入/退出复习模式"),
        ("[ / ]", "上一章 / 下一章"),
        ("g", "回到第一章"),
        ("R", "重载词典目录与词表缓存"),
        ("s", "立即保存错词本"),
        ("←/→", "打字时跳过词"),
    ];
    let mut lines = Vec::new();
    for (key, desc) in rows {
        lines.push(Line::from(vec![
            Span::styled(format!(" {key:<14}"), Style::default().fg(th.accent)),
            Span::styled(desc, Style::default().fg(th.fg)),
        ]));
    }
    lines.push(Line::from(Span::raw("")));
    lines.push(Line::from(Span::styled(
        " 任意键关闭 ",
        Style::default().fg(th.muted),
    )));
    let para = Paragraph::new(lines).block(block).wrap(Wrap { trim: false });
    f.render_widget(para, area);
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let vert = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);
    let horiz = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(vert[1]);
    horiz[1]
}

// ---------------- 主题与样式 ----------------

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ThemeKind {
    Dark,
    Light,
}

#[derive(Debug, Clone, Copy)]
struct Theme {
    fg: Color,
    muted: Color,
    accent: Color,
    bar_bg: Color,
    selection_bg: Color,
    good: Color,
    bad: Color,
    warn: Color,
    info: Color,
}

fn theme_of(kind: ThemeKind) -> Theme {
    match kind {
        ThemeKind::Dark => Theme {
            fg: Color::Rgb(220, 220, 220),
            muted: Color::Rgb(140, 140, 140),
            accent: Color::Rgb(95, 175, 255), // 蓝色系，参考 yazi 风格
            bar_bg: Color::Rgb(35, 40, 46),
            selection_bg: Color::Rgb(60, 65, 72),
            good: Color::Rgb(130, 200, 120),
            bad: Color::Rgb(235, 115, 115),
            warn: Color::Rgb(255, 200, 110),
            info: Color::Rgb(120, 170, 255),
        },
        ThemeKind::Light => Theme {
            fg: Color::Rgb(30, 30, 30),
            muted: Color::Rgb(120, 120, 120),
            accent: Color::Rgb(0, 122, 255),
            bar_bg: Color::Rgb(235, 240, 245),
            selection_bg: Color::Rgb(210, 220, 235),
            good: Color::Rgb(38, 166, 91),
            bad: Color::Rgb(200, 60, 60),
            warn: Color::Rgb(255, 160, 0),
            info: Color::Rgb(0, 122, 255),
        },
    }
}

// ---------------- 测试 ----------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Instant;

    fn make_words(n: usize) -> Vec<Word> {
        (0..n)
            .map(|i| Word {
                name: format!("w{i}"),
                ..Default::default()
            })
            .collect()
    }

    fn make_dict(id: &str, word_count: usize) -> DictInfo {
        DictInfo {
            id: id.to_string(),
            name: id.to_string(),
            url: format!("dicts/{id}.json"),
            word_count,
            category: String::new(),
            language: String::new(),
        }
    }

    fn temp_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("wordtk-test-{}-{tag}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    // ---- trans 归一化 ----

    #[test]
    fn normalize_keeps_only_strings_from_list() {
        assert_eq!(
            normalize_trans(&json!(["a", 1, "b", null])),
            vec!["a".to_string(), "b".to_string()]
        );
    }

    #[test]
    fn normalize_null_and_object_become_empty() {
        assert!(normalize_trans(&Value::Null).is_empty());
        assert!(normalize_trans(&json!({"zh": "释义"})).is_empty());
    }

    #[test]
    fn normalize_scalar_becomes_singleton() {
        assert_eq!(normalize_trans(&json!(42)), vec!["42".to_string()]);
        assert_eq!(normalize_trans(&json!(true)), vec!["true".to_string()]);
        assert_eq!(normalize_trans(&json!("释义")), vec!["释义".to_string()]);
    }

    #[test]
    fn normalize_is_idempotent_on_valid_lists() {
        let once = normalize_trans(&json!(["a", "b"]));
        let again = normalize_trans(&Value::Array(
            once.iter().cloned().map(Value::String).collect(),
        ));
        assert_eq!(once, again);
    }

    // ---- 章节切片 ----

    #[test]
    fn window_slices_fixed_chapters() {
        let list = make_words(60);
        let w2 = chapter_window(&list, 2);
        assert_eq!(w2.len(), 20);
        assert_eq!(w2[0].name, "w40");
        assert_eq!(w2[19].name, "w59");
        assert!(chapter_window(&list, 3).is_empty());
    }

    #[test]
    fn window_last_chapter_may_be_short() {
        let list = make_words(45);
        assert_eq!(chapter_window(&list, 2).len(), 5);
        assert_eq!(chapter_window(&list, 0).len(), 20);
    }

    // ---- 章节自愈 ----

    #[test]
    fn guard_resets_out_of_range_chapter() {
        let mut ch = 5;
        assert!(guard_chapter(&mut ch, 3));
        assert_eq!(ch, 0);

        let mut ch = 3;
        assert!(guard_chapter(&mut ch, 0));
        assert_eq!(ch, 0);
    }

    #[test]
    fn guard_leaves_in_range_chapter() {
        let mut ch = 2;
        assert!(!guard_chapter(&mut ch, 3));
        assert_eq!(ch, 2);

        // chapterCount == 0 且 chapter == 0：视为在界内
        let mut ch = 0;
        assert!(!guard_chapter(&mut ch, 0));
        assert_eq!(ch, 0);
    }

    // ---- 编号 ----

    #[test]
    fn tag_assigns_contiguous_indices() {
        let words = make_words(5);
        let tagged = tag_words(&words[2..5]);
        let idx: Vec<usize> = tagged.iter().map(|w| w.index).collect();
        assert_eq!(idx, vec![0, 1, 2]);
    }

    // ---- 数据源选择 ----

    #[test]
    fn resolve_prefers_intro_sample() {
        let fetched = make_words(60);
        let out = resolve_source(true, false, None, Some(&fetched), 0);
        assert_eq!(out.len(), FIRST_CHAPTER.len());
        assert_eq!(out[0].name, FIRST_CHAPTER[0].name);
    }

    #[test]
    fn resolve_review_without_record_is_empty() {
        assert!(resolve_source(false, true, None, None, 0).is_empty());
    }

    #[test]
    fn resolve_pending_fetch_is_empty() {
        assert!(resolve_source(false, false, None, None, 2).is_empty());
    }

    // ---- 装配场景 ----

    #[test]
    fn scenario_sentence_dict_chapter_zero_uses_intro() {
        let dict = make_dict("sentence", 600);
        let mut memo = WordListMemo::default();
        let mut chapter = 0usize;
        let out = assemble_word_list(
            &mut memo, &dict, &mut chapter, false, None, 0, None, true, None,
        );
        assert_eq!(out.words.len(), 20);
        assert_eq!(out.words[0].name, FIRST_CHAPTER[0].name);
        let idx: Vec<usize> = out.words.iter().map(|w| w.index).collect();
        assert_eq!(idx, (0..20).collect::<Vec<_>>());
    }

    #[test]
    fn scenario_review_mode_normalizes_scalar_trans() {
        let dict = make_dict("cet4", 2607);
        let review = vec![Word {
            name: "x".into(),
            trans: json!("y"),
            ..Default::default()
        }];
        let mut memo = WordListMemo::default();
        let mut chapter = 0usize;
        let out = assemble_word_list(
            &mut memo,
            &dict,
            &mut chapter,
            true,
            Some(&review),
            1,
            None,
            false,
            None,
        );
        assert_eq!(out.words.len(), 1);
        assert_eq!(out.words[0].name, "x");
        assert_eq!(out.words[0].trans, vec!["y".to_string()]);
        assert_eq!(out.words[0].index, 0);
    }

    #[test]
    fn scenario_out_of_range_chapter_resets_and_loads_empty() {
        // 3 章的词典（45 词），章节格却指到 5：本轮即用纠正后的 0
        let dict = make_dict("other", 45);
        let mut memo = WordListMemo::default();
        let mut chapter = 5usize;
        let out = assemble_word_list(
            &mut memo, &dict, &mut chapter, false, None, 0, None, true, None,
        );
        assert_eq!(chapter, 0);
        assert!(out.words.is_empty());
        assert!(out.is_loading);
        assert!(out.error.is_none());
    }

    #[test]
    fn scenario_guard_correction_applies_same_cycle() {
        // sentence 词典 + 越界章节：纠正到 0 后本轮就应命中例句样本
        let dict = make_dict("sentence", 600);
        let mut memo = WordListMemo::default();
        let mut chapter = 35usize;
        let out = assemble_word_list(
            &mut memo, &dict, &mut chapter, false, None, 0, None, true, None,
        );
        assert_eq!(chapter, 0);
        assert_eq!(out.words.len(), 20);
        assert_eq!(out.words[0].name, FIRST_CHAPTER[0].name);
    }

    #[test]
    fn scenario_fetch_error_passes_through() {
        let dict = make_dict("other", 45);
        let mut memo = WordListMemo::default();
        let mut chapter = 0usize;
        let out = assemble_word_list(
            &mut memo,
            &dict,
            &mut chapter,
            false,
            None,
            0,
            None,
            false,
            Some("404 Not Found"),
        );
        assert!(out.words.is_empty());
        assert!(!out.is_loading);
        assert_eq!(out.error.as_deref(), Some("404 Not Found"));
    }

    #[test]
    fn scenario_fetched_list_is_windowed() {
        let dict = make_dict("other", 60);
        let data = Arc::new(make_words(60));
        let mut memo = WordListMemo::default();
        let mut chapter = 2usize;
        let out = assemble_word_list(
            &mut memo,
            &dict,
            &mut chapter,
            false,
            None,
            0,
            Some(&data),
            false,
            None,
        );
        assert_eq!(out.words.len(), 20);
        assert_eq!(out.words[0].name, "w40");
        // index 按渲染顺序编号，与在完整词表中的位置无关
        assert_eq!(out.words[0].index, 0);
        assert_eq!(out.words[19].index, 19);
    }

    // ---- 变更检测 / 引用稳定 ----

    #[test]
    fn memo_reuses_output_when_deps_unchanged() {
        let dict = make_dict("other", 60);
        let data = Arc::new(make_words(60));
        let mut memo = WordListMemo::default();
        let mut chapter = 1usize;
        let a = assemble_word_list(
            &mut memo,
            &dict,
            &mut chapter,
            false,
            None,
            0,
            Some(&data),
            false,
            None,
        );
        let b = assemble_word_list(
            &mut memo,
            &dict,
            &mut chapter,
            false,
            None,
            0,
            Some(&data),
            false,
            None,
        );
        assert!(Arc::ptr_eq(&a.words, &b.words));

        // 任一依赖（这里是章节）变化则重算
        let mut chapter2 = 2usize;
        let c = assemble_word_list(
            &mut memo,
            &dict,
            &mut chapter2,
            false,
            None,
            0,
            Some(&data),
            false,
            None,
        );
        assert!(!Arc::ptr_eq(&a.words, &c.words));
        assert_eq!(c.words[0].name, "w40");
    }

    #[test]
    fn memo_tracks_review_revision() {
        let dict = make_dict("other", 60);
        let r1 = vec![Word {
            name: "x".into(),
            ..Default::default()
        }];
        let mut memo = WordListMemo::default();
        let mut chapter = 0usize;
        let a = assemble_word_list(
            &mut memo,
            &dict,
            &mut chapter,
            true,
            Some(&r1),
            1,
            None,
            false,
            None,
        );
        let r2: Vec<Word> = Vec::new();
        let b = assemble_word_list(
            &mut memo,
            &dict,
            &mut chapter,
            true,
            Some(&r2),
            2,
            None,
            false,
            None,
        );
        assert_eq!(a.words.len(), 1);
        assert!(b.words.is_empty());
    }

    // ---- 后台拉取 ----

    fn wait_fetch(fetcher: &mut WordListFetcher, url: &str) -> FetchState {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            fetcher.poll();
            match fetcher.get(url) {
                Some(FetchState::Pending) | None => {}
                Some(done) => return done.clone(),
            }
            assert!(Instant::now() < deadline, "拉取超时: {url}");
            thread::sleep(Duration::from_millis(10));
        }
    }

    #[test]
    fn fetcher_reads_local_file_and_dedups() {
        let dir = temp_dir("fetch");
        fs::write(
            dir.join("mini.json"),
            r#"[{"name":"abc","trans":["甲"]},{"name":"def"}]"#,
        )
        .unwrap();
        let mut fetcher = WordListFetcher::new(dir);
        fetcher.request("mini.json");
        let state = wait_fetch(&mut fetcher, "mini.json");
        match state {
            FetchState::Ready(words) => {
                assert_eq!(words.len(), 2);
                assert_eq!(words[0].name, "abc");
                // trans 缺省时落到 Null，由归一化兜底
                assert!(normalize_trans(&words[1].trans).is_empty());
            }
            other => panic!("预期 Ready，实际 {other:?}"),
        }
        // 已完成的 URL 重复请求不重新拉取
        fetcher.request("mini.json");
        assert!(matches!(
            fetcher.get("mini.json"),
            Some(FetchState::Ready(_))
        ));
    }

    #[test]
    fn fetcher_reports_missing_file() {
        let dir = temp_dir("fetch-missing");
        let mut fetcher = WordListFetcher::new(dir);
        fetcher.request("nope.json");
        match wait_fetch(&mut fetcher, "nope.json") {
            FetchState::Failed(e) => assert!(e.contains("nope.json")),
            other => panic!("预期 Failed，实际 {other:?}"),
        }
    }

    // ---- 错词本 ----

    #[test]
    fn review_store_collapses_duplicates_and_round_trips() {
        let dir = temp_dir("review");
        let path = dir.join("review.json");
        let _ = fs::remove_file(&path);

        let mut store = ReviewStore::open(path.clone()).unwrap();
        store.record_miss(
            Word {
                name: "apple".into(),
                trans: json!(["苹果"]),
                ..Default::default()
            },
            "cet4",
        );
        store.record_miss(
            Word {
                name: "apple".into(),
                trans: json!(["苹果", "苹果公司"]),
                ..Default::default()
            },
            "cet4",
        );
        store.record_miss(
            Word {
                name: "banana".into(),
                trans: json!(["香蕉"]),
                ..Default::default()
            },
            "cet4",
        );
        assert_eq!(store.words().len(), 2);
        assert_eq!(store.rev(), 3);
        store.save().unwrap();

        let reopened = ReviewStore::open(path).unwrap();
        assert_eq!(reopened.words().len(), 2);
        assert_eq!(reopened.words()[0].name, "apple");
        assert_eq!(
            normalize_trans(&reopened.words()[0].trans),
            vec!["苹果".to_string(), "苹果公司".to_string()]
        );
    }

    #[test]
    fn review_store_remove_bumps_revision() {
        let dir = temp_dir("review-remove");
        let path = dir.join("review.json");
        let _ = fs::remove_file(&path);

        let mut store = ReviewStore::open(path).unwrap();
        store.record_miss(
            Word {
                name: "apple".into(),
                ..Default::default()
            },
            "cet4",
        );
        let rev = store.rev();
        store.remove("apple");
        assert!(store.words().is_empty());
        assert_eq!(store.rev(), rev + 1);
        // 不存在的词不计一次变更
        store.remove("apple");
        assert_eq!(store.rev(), rev + 1);
    }

    // ---- 打字交互 ----

    fn test_app(tag: &str) -> App {
        let dir = temp_dir(tag);
        let path = dir.join("review.json");
        let _ = fs::remove_file(&path);
        let review = ReviewStore::open(path).unwrap();
        App::new(
            vec![make_dict("cet4", 2607)],
            dir,
            review,
            0,
            0,
            false,
            theme_of(ThemeKind::Dark),
            default_keymap(),
        )
    }

    fn set_words(app: &mut App, words: &[Word]) {
        app.word_list = WordList {
            words: Arc::new(tag_words(words)),
            is_loading: false,
            error: None,
        };
    }

    #[test]
    fn typing_wrong_char_records_miss_once() {
        let mut app = test_app("typing-miss");
        set_words(
            &mut app,
            &[Word {
                name: "go".into(),
                trans: json!(["去"]),
                ..Default::default()
            }],
        );
        on_typing_char(&mut app, 'x');
        on_typing_char(&mut app, 'z');
        assert_eq!(app.typing.wrong, 2);
        assert!(app.typing.input.is_empty());
        // 同一个词只记一次
        assert_eq!(app.review.words().len(), 1);
        assert_eq!(app.review.words()[0].name, "go");
    }

    #[test]
    fn typing_completion_advances_and_wraps() {
        let mut app = test_app("typing-done");
        set_words(
            &mut app,
            &[
                Word {
                    name: "go".into(),
                    ..Default::default()
                },
                Word {
                    name: "if".into(),
                    ..Default::default()
                },
            ],
        );
        on_typing_char(&mut app, 'g');
        assert_eq!(app.typing.input, "g");
        on_typing_char(&mut app, 'o');
        assert_eq!(app.typing.pos, 1);
        assert_eq!(app.typing.correct, 1);
        on_typing_char(&mut app, 'i');
        on_typing_char(&mut app, 'f');
        // 本章最后一词完成后回到开头
        assert_eq!(app.typing.pos, 0);
        assert_eq!(app.typing.correct, 2);
    }

    #[test]
    fn typing_in_review_mode_removes_completed_word() {
        let mut app = test_app("typing-review");
        app.review_mode = true;
        app.review.record_miss(
            Word {
                name: "go".into(),
                ..Default::default()
            },
            "cet4",
        );
        set_words(
            &mut app,
            &[Word {
                name: "go".into(),
                ..Default::default()
            }],
        );
        on_typing_char(&mut app, 'g');
        on_typing_char(&mut app, 'o');
        assert!(app.review.words().is_empty());
    }
}
