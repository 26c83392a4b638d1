use maud::{Markup, html};

use super::ChartConfig;
use super::axis::compute_ticks;
use super::path::{Point, build_smooth_path};
use crate::color::Color;
use crate::theme::Theme;
use crate::traffic::DailySeries;

const MARGIN_TOP: f64 = 60.0;
const MARGIN_RIGHT: f64 = 50.0;
const MARGIN_BOTTOM: f64 = 80.0;
const MARGIN_LEFT: f64 = 60.0;

const TITLE_STYLE: &str = "font-size: 20px; font-family: Arial";
const LABEL_STYLE: &str = "font-size: 12px; font-family: Arial";
const AXIS_TITLE_STYLE: &str = "font-size: 14px; font-family: Arial";
const GRID_DASH: &str = "5,5";
const GRID_OPACITY: &str = "0.5";

const LINE_WIDTH: u32 = 4;
const POINT_RADIUS: u32 = 4;
const LEGEND_LINE_WIDTH: u32 = 3;
const DRAW_DURATION: &str = "2s";

/// Colors for every role in the chart, with request overrides applied.
struct Palette<'a> {
    background: &'a Color,
    text: &'a Color,
    grid: &'a Color,
    clones_line: &'a Color,
    views_line: &'a Color,
    clones_point: &'a Color,
    views_point: &'a Color,
}

impl<'a> Palette<'a> {
    fn resolve(config: &'a ChartConfig, theme: &'a Theme) -> Self {
        fn pick<'c>(over: &'c Option<Color>, fallback: &'c Color) -> &'c Color {
            over.as_ref().unwrap_or(fallback)
        }

        Palette {
            background: pick(&config.bg_color, &theme.background_color),
            text: &theme.text_color,
            grid: &theme.grid_color,
            clones_line: pick(&config.clones_color, &theme.line_colors.clones),
            views_line: pick(&config.views_color, &theme.line_colors.views),
            clones_point: pick(&config.clones_point_color, &theme.point_colors.clones),
            views_point: pick(&config.views_point_color, &theme.point_colors.views),
        }
    }
}

fn format_value(v: f64) -> String {
    if v == v.floor() {
        format!("{v:.0}")
    } else {
        format!("{v:.1}")
    }
}

/// Renders the traffic line chart. Pure: equal inputs give byte-identical output.
pub fn render(
    profile_name: &str,
    series: &DailySeries,
    config: &ChartConfig,
    theme: &Theme,
) -> String {
    let palette = Palette::resolve(config, theme);

    let width = f64::from(config.width);
    let height = f64::from(config.height);
    let plot_w = width - MARGIN_LEFT - MARGIN_RIGHT;
    let plot_h = height - MARGIN_TOP - MARGIN_BOTTOM;
    let baseline = height - MARGIN_BOTTOM;

    let days: Vec<String> = series.keys().map(|d| d.format("%d").to_string()).collect();
    let clones: Vec<u64> = series.values().map(|t| t.clones).collect();
    let views: Vec<u64> = series.values().map(|t| t.views).collect();

    let max_value = clones.iter().chain(&views).copied().max().unwrap_or(0) as f64;
    let (nice_max, ticks) = compute_ticks(max_value, config.ticks as usize);
    let y_scale = if nice_max > 0.0 { plot_h / nice_max } else { 1.0 };
    let x_step = if days.len() > 1 {
        plot_w / (days.len() - 1) as f64
    } else {
        plot_w
    };

    let x_at = |i: usize| MARGIN_LEFT + i as f64 * x_step;
    let to_points = |values: &[u64]| -> Vec<Point> {
        values
            .iter()
            .enumerate()
            .map(|(i, &v)| Point::new(x_at(i), baseline - v as f64 * y_scale))
            .collect()
    };

    let label_y = baseline + 20.0;
    let legend_y = height - MARGIN_BOTTOM / 3.0 + 15.0;
    let mid_x = width / 2.0;
    let count_x = MARGIN_LEFT / 3.0;

    let markup = html! {
        svg xmlns="http://www.w3.org/2000/svg" width=(config.width) height=(config.height)
            viewBox=(format!("0 0 {} {}", config.width, config.height))
        {
            rect x="0" y="0" width=(config.width) height=(config.height) rx=(config.radius) ry=(config.radius)
                fill=(palette.background.rgb()) fill-opacity=(palette.background.opacity()) {}

            text x=(mid_x) y=(MARGIN_TOP / 2.0) text-anchor="middle" style=(TITLE_STYLE)
                fill=(palette.text.rgb()) fill-opacity=(palette.text.opacity())
            {
                (profile_name) "'s Repo Traffic Stats"
            }

            line x1=(MARGIN_LEFT) y1=(baseline) x2=(width - MARGIN_RIGHT) y2=(baseline)
                stroke=(palette.grid.rgb()) stroke-opacity=(palette.grid.opacity()) {}
            line x1=(MARGIN_LEFT) y1=(MARGIN_TOP) x2=(MARGIN_LEFT) y2=(baseline)
                stroke=(palette.grid.rgb()) stroke-opacity=(palette.grid.opacity()) {}

            @for tick in &ticks {
                @let y = baseline - tick * y_scale;
                line x1=(MARGIN_LEFT) y1=(y) x2=(width - MARGIN_RIGHT) y2=(y)
                    stroke=(palette.grid.rgb()) stroke-opacity=(palette.grid.opacity())
                    stroke-width="1" stroke-dasharray=(GRID_DASH) opacity=(GRID_OPACITY) {}
                text x=(MARGIN_LEFT - 10.0) y=(y + 5.0) text-anchor="end" style=(LABEL_STYLE)
                    fill=(palette.text.rgb()) fill-opacity=(palette.text.opacity())
                {
                    (format_value(*tick))
                }
            }

            @for i in 0..days.len() {
                @let x = x_at(i);
                line x1=(x) y1=(MARGIN_TOP) x2=(x) y2=(baseline)
                    stroke=(palette.grid.rgb()) stroke-opacity=(palette.grid.opacity())
                    stroke-width="1" stroke-dasharray=(GRID_DASH) opacity=(GRID_OPACITY) {}
            }

            (series_markup(&to_points(&clones), palette.clones_line, palette.clones_point))
            (series_markup(&to_points(&views), palette.views_line, palette.views_point))

            @for (i, day) in days.iter().enumerate() {
                @let x = x_at(i);
                text x=(x) y=(label_y) transform=(format!("rotate(45, {x}, {label_y})")) style=(LABEL_STYLE)
                    fill=(palette.text.rgb()) fill-opacity=(palette.text.opacity())
                {
                    (day)
                }
            }

            text x=(mid_x) y=(height - MARGIN_BOTTOM / 3.0) text-anchor="middle" style=(AXIS_TITLE_STYLE)
                fill=(palette.text.rgb()) fill-opacity=(palette.text.opacity())
            {
                "Days"
            }
            text x=(count_x) y=(height / 2.0) text-anchor="middle" style=(AXIS_TITLE_STYLE)
                transform=(format!("rotate(-90, {count_x}, {})", height / 2.0))
                fill=(palette.text.rgb()) fill-opacity=(palette.text.opacity())
            {
                "Count"
            }

            (legend_entry("Clones", mid_x - 60.0, legend_y, palette.clones_line, palette.text))
            (legend_entry("Views", mid_x + 40.0, legend_y, palette.views_line, palette.text))
        }
    };

    markup.into_string()
}

/// The animated line for one series, then its point markers on top.
fn series_markup(points: &[Point], line: &Color, marker: &Color) -> Markup {
    let smooth = build_smooth_path(points);
    let length = smooth.length();

    html! {
        @if !smooth.is_empty() {
            path d=(smooth.to_string()) fill="none" stroke=(line.rgb()) stroke-opacity=(line.opacity())
                stroke-width=(LINE_WIDTH) stroke-linecap="round" stroke-linejoin="round"
                stroke-dasharray=(length) stroke-dashoffset=(length)
            {
                animate attributeName="stroke-dashoffset" from=(length) to="0" dur=(DRAW_DURATION)
                    repeatCount="1" fill="freeze" {}
            }
        }
        @for p in points {
            circle cx=(p.x) cy=(p.y) r=(POINT_RADIUS) fill=(marker.rgb()) fill-opacity=(marker.opacity()) {}
        }
    }
}

fn legend_entry(label: &str, x: f64, y: f64, line: &Color, text: &Color) -> Markup {
    html! {
        line x1=(x) y1=(y) x2=(x + 20.0) y2=(y) stroke=(line.rgb()) stroke-opacity=(line.opacity())
            stroke-width=(LEGEND_LINE_WIDTH) {}
        text x=(x + 30.0) y=(y + 5.0) style=(LABEL_STYLE) fill=(text.rgb()) fill-opacity=(text.opacity()) {
            (label)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::NaiveDate;

    use super::*;
    use crate::theme::ThemeStore;
    use crate::traffic::DayTotals;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    fn single_day() -> DailySeries {
        [(day(1), DayTotals { clones: 4, views: 5 })].into()
    }

    fn week() -> DailySeries {
        (1..=7)
            .map(|d| {
                (
                    day(d),
                    DayTotals {
                        clones: u64::from(d * 3 % 5),
                        views: u64::from(d * 7 % 11),
                    },
                )
            })
            .collect()
    }

    fn default_theme() -> Arc<Theme> {
        ThemeStore::bundled().load("default").unwrap()
    }

    #[test]
    fn test_single_day_chart() {
        let svg = render("Alice", &single_day(), &ChartConfig::default(), &default_theme());

        assert!(svg.starts_with("<svg xmlns=\"http://www.w3.org/2000/svg\""));
        assert!(svg.contains("Alice's Repo Traffic Stats"));
        assert_eq!(svg.matches(">01</text>").count(), 1);
        // Ticks from compute_ticks(5, 5): 0 through 5.
        for label in ["0", "1", "2", "3", "4", "5"] {
            assert!(svg.contains(&format!(">{label}</text>")), "missing tick {label}");
        }
        assert!(!svg.contains(">6</text>"));
        // A single point is a bare move-to with zero length.
        assert!(svg.contains("d=\"M 60,"));
        assert!(svg.contains("stroke-dasharray=\"0\""));
        assert!(!svg.contains("\"-0\""));
        assert_eq!(svg.matches("<circle").count(), 2);
    }

    #[test]
    fn test_render_is_pure() {
        let config = ChartConfig {
            clones_color: Some(Color::from_hex_digits("ff573380").unwrap()),
            ..ChartConfig::default()
        };
        let theme = default_theme();
        let first = render("Alice", &week(), &config, &theme);
        let second = render("Alice", &week(), &config, &theme);
        assert_eq!(first, second);
    }

    #[test]
    fn test_overrides_replace_theme_colors() {
        let theme = default_theme();
        let config = ChartConfig {
            bg_color: Some(Color::from_hex_digits("12345680").unwrap()),
            views_point_color: Some(Color::from_hex_digits("abcdef").unwrap()),
            ..ChartConfig::default()
        };
        let svg = render("Alice", &week(), &config, &theme);

        assert!(svg.contains("fill=\"#123456\""));
        assert!(svg.contains(&format!("fill-opacity=\"{}\"", 128.0 / 255.0)));
        assert!(svg.contains("fill=\"#abcdef\""));
        assert!(!svg.contains(&format!("fill=\"{}\"", theme.background_color.rgb())));
        assert!(svg.contains(&format!("stroke=\"{}\"", theme.line_colors.clones.rgb())));
    }

    #[test]
    fn test_element_order() {
        let svg = render("Alice", &week(), &ChartConfig::default(), &default_theme());
        let pos = |needle: &str| svg.find(needle).unwrap_or_else(|| panic!("missing {needle}"));

        assert!(pos("<rect") < pos("Repo Traffic Stats"));
        assert!(pos("Repo Traffic Stats") < pos("<line"));
        assert!(pos("stroke-dasharray=\"5,5\"") < pos("<path"));
        assert!(pos("<path") < pos("<circle"));
        assert!(pos("<circle") < pos(">01</text>"));
        assert!(pos(">01</text>") < pos(">Days</text>"));
        assert!(pos(">Count</text>") < pos(">Clones</text>"));
        assert!(pos(">Clones</text>") < pos(">Views</text>"));
        assert_eq!(svg.matches("<path").count(), 2);
        assert_eq!(svg.matches("<animate").count(), 2);
        assert_eq!(svg.matches("<circle").count(), 14);
    }

    #[test]
    fn test_empty_series_has_axes_only() {
        let svg = render("Alice", &DailySeries::new(), &ChartConfig::default(), &default_theme());
        assert!(!svg.contains("<path"));
        assert!(!svg.contains("<circle"));
        assert!(svg.contains(">0</text>"));
        assert!(svg.contains(">Views</text>"));
    }

    #[test]
    fn test_dimensions_follow_config() {
        let config = ChartConfig {
            width: 1200,
            height: 600,
            radius: 0,
            ..ChartConfig::default()
        };
        let svg = render("Alice", &week(), &config, &default_theme());
        assert!(svg.contains("viewBox=\"0 0 1200 600\""));
        assert!(svg.contains("rx=\"0\""));
    }

    #[test]
    fn test_profile_name_is_escaped() {
        let svg = render("<b>", &single_day(), &ChartConfig::default(), &default_theme());
        assert!(svg.contains("&lt;b&gt;"));
        assert!(!svg.contains("<b>"));
    }
}
