use serde::Serialize;

/// M3U 列表中的一个频道
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Channel {
    pub name: String,
    pub url: String,
}

/// 解析 M3U 播放列表
///
/// `#EXTINF:...,名称` 之后的第一条非注释、非空行视为该频道的地址。
/// 没有名称的地址行被忽略。
pub fn parse_m3u(content: &str) -> Vec<Channel> {
    let mut channels = Vec::new();
    let mut pending: Option<String> = None;

    for line in content.lines() {
        let line = line.trim();
        if let Some(info) = line.strip_prefix("#EXTINF:") {
            pending = info
                .rsplit_once(',')
                .map(|(_, name)| name.trim())
                .filter(|name| !name.is_empty())
                .map(str::to_string);
        } else if !line.is_empty() && !line.starts_with('#') {
            if let Some(name) = pending.take() {
                channels.push(Channel {
                    name,
                    url: line.to_string(),
                });
            }
        }
    }

    channels
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pairs_extinf_with_following_url() {
        let content = "#EXTM3U\n\
            #EXTINF:-1 tvg-id=\"news\" group-title=\"News\",News 24\n\
            #EXTVLCOPT:http-user-agent=foo\n\
            \n\
            https://cdn.example.com/news/index.m3u8\n\
            #EXTINF:-1,Music\r\n\
            http://example.com/music.m3u8\r\n";

        let channels = parse_m3u(content);
        assert_eq!(
            channels,
            vec![
                Channel {
                    name: "News 24".to_string(),
                    url: "https://cdn.example.com/news/index.m3u8".to_string(),
                },
                Channel {
                    name: "Music".to_string(),
                    url: "http://example.com/music.m3u8".to_string(),
                },
            ]
        );
    }

    #[test]
    fn urls_without_extinf_are_skipped() {
        let channels = parse_m3u("#EXTM3U\nhttp://orphan.example.com/a.m3u8\n#EXTINF:-1,Only\n");
        assert!(channels.is_empty());
    }
}
